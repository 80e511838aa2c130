// src/scoring.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{
    answer::AnswerValue,
    form::{Field, FieldType, FormDefinition},
};

/// Grading outcome for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOutcome {
    pub field_id: String,
    pub points: u32,
    pub awarded: u32,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub score: u32,
    pub max_score: u32,
    pub fields: Vec<FieldOutcome>,
}

impl ScoreReport {
    /// `round(score / max_score * 100)`, or 0 for an ungraded form.
    pub fn percentage(&self) -> u32 {
        percentage(self.score, self.max_score)
    }
}

pub fn percentage(score: u32, max_score: u32) -> u32 {
    if max_score == 0 {
        return 0;
    }
    (f64::from(score) / f64::from(max_score) * 100.0).round() as u32
}

/// Scores a set of answers against a form.
///
/// * Only fields with quiz data and `points > 0` are graded; others contribute zero.
/// * A field with no configured answer key is awarded full points.
/// * Scoring is all-or-nothing per field.
pub fn score(form: &FormDefinition, answers: &BTreeMap<String, AnswerValue>) -> ScoreReport {
    let mut total: u32 = 0;
    let mut max_score: u32 = 0;
    let mut fields = Vec::new();

    for field in &form.fields {
        let Some(quiz) = &field.quiz else { continue };
        if quiz.points == 0 {
            continue;
        }

        max_score = max_score.saturating_add(quiz.points);
        let correct = quiz.correct_options.is_empty() || is_correct(field, answers.get(&field.id));
        let awarded = if correct { quiz.points } else { 0 };
        total = total.saturating_add(awarded);

        fields.push(FieldOutcome {
            field_id: field.id.clone(),
            points: quiz.points,
            awarded,
            correct,
        });
    }

    ScoreReport {
        score: total,
        max_score,
        fields,
    }
}

fn is_correct(field: &Field, answer: Option<&AnswerValue>) -> bool {
    let Some(answer) = answer else { return false };
    let Some(quiz) = &field.quiz else { return false };

    match (field.field_type, answer) {
        (FieldType::SingleChoice | FieldType::Dropdown, AnswerValue::Choice(selected)) => field
            .options
            .iter()
            .enumerate()
            .any(|(i, opt)| opt == selected && quiz.correct_options.contains(&i)),
        (FieldType::MultiChoice, AnswerValue::Choices(selected)) => {
            let selected: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
            let expected: BTreeSet<&str> = field.correct_labels().into_iter().collect();
            selected == expected
        }
        // Free-text style fields are not compared against the key.
        (
            FieldType::ShortText
            | FieldType::LongText
            | FieldType::Email
            | FieldType::Number
            | FieldType::Date
            | FieldType::Time,
            value,
        ) => field.field_type.accepts(value) && !value.is_empty(),
        _ => false,
    }
}
