// src/session/identity.rs

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use validator::ValidateEmail;

use crate::models::{form::IdentityRequirements, identity::ResponderIdentity};

const MAX_NAME_LEN: usize = 100;

fn student_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{1,32}$").expect("static regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Name,
    Email,
    StudentId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProblem {
    pub field: IdentityField,
    pub message: &'static str,
}

/// Every identity field that failed validation, for inline display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe(.problems))]
pub struct IdentityError {
    pub problems: Vec<FieldProblem>,
}

impl IdentityError {
    pub fn has(&self, field: IdentityField) -> bool {
        self.problems.iter().any(|p| p.field == field)
    }
}

fn describe(problems: &[FieldProblem]) -> String {
    problems
        .iter()
        .map(|p| format!("{:?}: {}", p.field, p.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validates responder identity against a form's requirements before a
/// session may begin.
#[derive(Debug, Clone, Copy)]
pub struct IdentityGate {
    requirements: IdentityRequirements,
}

impl IdentityGate {
    pub fn new(requirements: IdentityRequirements) -> Self {
        Self { requirements }
    }

    pub fn is_required(&self) -> bool {
        self.requirements.any()
    }

    /// Returns the trimmed identity, or every problem found.
    ///
    /// Optional fields that are supplied are still checked for format.
    pub fn verify(&self, identity: &ResponderIdentity) -> Result<ResponderIdentity, IdentityError> {
        let mut problems = Vec::new();

        let name = normalize(&identity.name);
        let email = normalize(&identity.email);
        let student_id = normalize(&identity.student_id);

        match &name {
            None if self.requirements.name => problems.push(FieldProblem {
                field: IdentityField::Name,
                message: "name is required",
            }),
            Some(n) if n.chars().count() > MAX_NAME_LEN => problems.push(FieldProblem {
                field: IdentityField::Name,
                message: "name is too long",
            }),
            _ => {}
        }

        match &email {
            None if self.requirements.email => problems.push(FieldProblem {
                field: IdentityField::Email,
                message: "email is required",
            }),
            Some(e) if !e.validate_email() => problems.push(FieldProblem {
                field: IdentityField::Email,
                message: "email is malformed",
            }),
            _ => {}
        }

        match &student_id {
            None if self.requirements.student_id => problems.push(FieldProblem {
                field: IdentityField::StudentId,
                message: "student id is required",
            }),
            Some(id) if !student_id_pattern().is_match(id) => problems.push(FieldProblem {
                field: IdentityField::StudentId,
                message: "student id may only contain letters, digits and dashes",
            }),
            _ => {}
        }

        if !problems.is_empty() {
            return Err(IdentityError { problems });
        }

        Ok(ResponderIdentity {
            name,
            email,
            student_id,
        })
    }
}

fn normalize(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
