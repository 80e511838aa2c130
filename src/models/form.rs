// src/models/form.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::AnswerValue;

/// Discriminates a graded quiz from a plain data-collection form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Quiz,
    Form,
}

/// The fixed set of input types a field may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    ShortText,
    LongText,
    Email,
    Number,
    Date,
    Time,
    SingleChoice,
    MultiChoice,
    Dropdown,
}

impl FieldType {
    /// Choice types carry an ordered option list.
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            FieldType::SingleChoice | FieldType::MultiChoice | FieldType::Dropdown
        )
    }

    /// Returns true if `value` has the shape this field type stores.
    pub fn accepts(self, value: &AnswerValue) -> bool {
        match (self, value) {
            (FieldType::ShortText | FieldType::LongText | FieldType::Email, AnswerValue::Text(_)) => true,
            (FieldType::Number, AnswerValue::Number(n)) => n.is_finite(),
            (FieldType::Date, AnswerValue::Date(_)) => true,
            (FieldType::Time, AnswerValue::Time(_)) => true,
            (FieldType::SingleChoice | FieldType::Dropdown, AnswerValue::Choice(_)) => true,
            (FieldType::MultiChoice, AnswerValue::Choices(_)) => true,
            _ => false,
        }
    }
}

/// Grading data attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizMeta {
    #[serde(default)]
    pub points: u32,

    /// Indices into `Field::options`. Empty means no answer key is configured.
    #[serde(default)]
    pub correct_options: BTreeSet<usize>,

    #[serde(default)]
    pub explanation: String,
}

/// One question or input of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    #[validate(length(min = 1, max = 1000))]
    pub label: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,

    /// Optional short code echoed back in submissions (e.g. "Q3").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizMeta>,
}

impl Field {
    pub fn points(&self) -> u32 {
        self.quiz.as_ref().map(|q| q.points).unwrap_or(0)
    }

    /// Labels at the configured correct indices, in option order.
    pub fn correct_labels(&self) -> Vec<&str> {
        match &self.quiz {
            Some(q) => q
                .correct_options
                .iter()
                .filter_map(|&i| self.options.get(i).map(String::as_str))
                .collect(),
            None => Vec::new(),
        }
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    let mut seen = BTreeSet::new();
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
        // Answers name options by label, so labels must be unique.
        if !seen.insert(opt.as_str()) {
            return Err(validator::ValidationError::new("duplicate_option"));
        }
    }
    Ok(())
}

/// Which identity fields a responder must fill in before starting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRequirements {
    #[serde(default)]
    pub name: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub student_id: bool,
}

impl IdentityRequirements {
    pub fn any(&self) -> bool {
        self.name || self.email || self.student_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSettings {
    #[serde(default)]
    pub identity: IdentityRequirements,

    /// Total time budget. `None` means the form is untimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_from: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_until: Option<DateTime<Utc>>,

    #[serde(default)]
    pub prevent_copy_paste: bool,
}

impl FormSettings {
    /// The allowed session length in milliseconds, if the form is timed.
    pub fn budget_ms(&self) -> Option<i64> {
        self.timer_minutes.map(|m| i64::from(m) * 60_000)
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let after_start = self.available_from.is_none_or(|from| now >= from);
        let before_end = self.available_until.is_none_or(|until| now <= until);
        after_start && before_end
    }
}

/// A form or quiz as authored. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_form))]
pub struct FormDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[serde(rename = "type")]
    pub kind: FormKind,

    #[validate(length(min = 1, max = 500), nested)]
    pub fields: Vec<Field>,

    #[serde(default)]
    pub settings: FormSettings,
}

impl FormDefinition {
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn is_quiz(&self) -> bool {
        self.kind == FormKind::Quiz
    }

    /// Copy with answer keys and explanations removed, safe to hand to responders.
    pub fn to_public(&self) -> FormDefinition {
        let mut public = self.clone();
        for field in &mut public.fields {
            if let Some(quiz) = &mut field.quiz {
                quiz.correct_options.clear();
                quiz.explanation.clear();
            }
        }
        public
    }
}

/// Upper bound for one field's points.
pub const MAX_FIELD_POINTS: u32 = 1_000;
/// Upper bound for the points of a whole form.
pub const MAX_TOTAL_POINTS: u64 = 100_000;

fn validate_form(form: &FormDefinition) -> Result<(), validator::ValidationError> {
    let mut seen = BTreeSet::new();
    let mut total_points: u64 = 0;
    for field in &form.fields {
        if !seen.insert(field.id.as_str()) {
            return Err(validator::ValidationError::new("duplicate_field_id"));
        }
        if field.field_type.is_choice() && field.options.is_empty() {
            return Err(validator::ValidationError::new("choice_field_without_options"));
        }
        if let Some(quiz) = &field.quiz {
            if quiz.points > MAX_FIELD_POINTS {
                return Err(validator::ValidationError::new("field_points_too_large"));
            }
            total_points += u64::from(quiz.points);
            if quiz.correct_options.iter().any(|&i| i >= field.options.len()) {
                return Err(validator::ValidationError::new("correct_option_out_of_range"));
            }
        }
    }
    if total_points > MAX_TOTAL_POINTS {
        return Err(validator::ValidationError::new("total_points_too_large"));
    }
    if let (Some(from), Some(until)) = (form.settings.available_from, form.settings.available_until) {
        if from > until {
            return Err(validator::ValidationError::new("availability_window_inverted"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FormDefinition {
        serde_json::from_value(json!({
            "title": "Capitals",
            "type": "quiz",
            "fields": [
                {
                    "id": "q1",
                    "label": "Capital of France?",
                    "type": "single_choice",
                    "options": ["Berlin", "Paris"],
                    "quiz": { "points": 5, "correctOptions": [1], "explanation": "Paris." }
                }
            ],
            "settings": { "timerMinutes": 10 }
        }))
        .unwrap()
    }

    #[test]
    fn test_parses_camel_case_definition() {
        let form = sample();
        assert!(form.is_quiz());
        assert_eq!(form.settings.budget_ms(), Some(600_000));
        assert_eq!(form.field("q1").unwrap().correct_labels(), vec!["Paris"]);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_public_copy_hides_answer_key() {
        let public = sample().to_public();
        let quiz = public.fields[0].quiz.as_ref().unwrap();
        assert!(quiz.correct_options.is_empty());
        assert!(quiz.explanation.is_empty());
        assert_eq!(quiz.points, 5);
    }

    #[test]
    fn test_rejects_out_of_range_correct_option() {
        let mut form = sample();
        form.fields[0].quiz.as_mut().unwrap().correct_options.insert(7);
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_field_ids() {
        let mut form = sample();
        form.fields.push(form.fields[0].clone());
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_rejects_blank_and_duplicate_options() {
        let mut form = sample();
        form.fields[0].options = vec!["Paris".into(), "Paris".into()];
        assert!(form.validate().is_err());

        form.fields[0].options = vec!["Berlin".into(), "  ".into()];
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_points() {
        let mut form = sample();
        form.fields[0].quiz.as_mut().unwrap().points = 4_000_000_000;
        assert!(form.validate().is_err());

        // Each field within its cap, the total over the form cap
        let mut form = sample();
        form.fields[0].quiz.as_mut().unwrap().points = MAX_FIELD_POINTS;
        let template = form.fields[0].clone();
        let per_form = (MAX_TOTAL_POINTS / u64::from(MAX_FIELD_POINTS)) as usize;
        for i in 1..=per_form {
            let mut field = template.clone();
            field.id = format!("q{}", i + 1);
            form.fields.push(field);
        }
        assert!(form.validate().is_err());

        form.fields.pop();
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_availability_window() {
        let mut settings = FormSettings::default();
        let now = Utc::now();
        assert!(settings.is_open_at(now));
        settings.available_until = Some(now - chrono::Duration::minutes(1));
        assert!(!settings.is_open_at(now));
    }
}
