// src/session/results.rs

use std::fmt;

use serde::Serialize;

use crate::{
    models::{form::FormDefinition, submission::SubmissionResult},
    scoring,
};

/// One row of the per-question breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
    pub field_id: String,
    pub label: String,
    pub your_answer: Option<String>,
    pub points: u32,
    pub awarded: u32,
    pub correct: bool,
    /// Present only when answers are revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsView {
    pub score: u32,
    pub max_score: u32,
    pub percentage: u32,
    pub duration: String,
    pub start_time: String,
    pub end_time: String,
    pub expired: bool,
    pub violation_count: usize,
    pub revealed: bool,
    pub questions: Vec<QuestionRow>,
}

/// Presents a completed attempt, with a toggle for the answer key.
pub struct ResultsPresenter<'a> {
    form: &'a FormDefinition,
    result: &'a SubmissionResult,
    reveal: bool,
}

impl<'a> ResultsPresenter<'a> {
    pub fn new(form: &'a FormDefinition, result: &'a SubmissionResult) -> Self {
        Self {
            form,
            result,
            reveal: false,
        }
    }

    pub fn percentage(&self) -> u32 {
        scoring::percentage(self.result.score, self.result.max_score)
    }

    pub fn is_revealed(&self) -> bool {
        self.reveal
    }

    /// Flips answer reveal and returns the new setting.
    pub fn toggle_reveal(&mut self) -> bool {
        self.reveal = !self.reveal;
        self.reveal
    }

    pub fn view(&self) -> ResultsView {
        let questions = self
            .result
            .fields
            .iter()
            .filter_map(|outcome| {
                let field = self.form.field(&outcome.field_id)?;
                let (correct_answer, explanation) = if self.reveal {
                    let labels = field.correct_labels();
                    let explanation = field
                        .quiz
                        .as_ref()
                        .map(|q| q.explanation.clone())
                        .filter(|e| !e.is_empty());
                    ((!labels.is_empty()).then(|| labels.join(", ")), explanation)
                } else {
                    (None, None)
                };

                Some(QuestionRow {
                    field_id: outcome.field_id.clone(),
                    label: field.label.clone(),
                    your_answer: self.result.answers.get(&outcome.field_id).map(|a| a.display()),
                    points: outcome.points,
                    awarded: outcome.awarded,
                    correct: outcome.correct,
                    correct_answer,
                    explanation,
                })
            })
            .collect();

        ResultsView {
            score: self.result.score,
            max_score: self.result.max_score,
            percentage: self.percentage(),
            duration: format_duration(self.result.duration_ms),
            start_time: self.result.start_time.clone(),
            end_time: self.result.end_time.clone(),
            expired: self.result.expired,
            violation_count: self.result.violations.len(),
            revealed: self.reveal,
            questions,
        }
    }
}

/// `mm:ss`, with hours prefixed when needed.
pub fn format_duration(duration_ms: i64) -> String {
    let total = duration_ms.max(0) / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

impl fmt::Display for ResultsPresenter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.view();
        writeln!(f, "{}", self.form.title)?;
        writeln!(f, "Score: {}/{} ({}%)", view.score, view.max_score, view.percentage)?;
        writeln!(f, "Time taken: {}", view.duration)?;
        writeln!(f, "Started: {}", view.start_time)?;
        writeln!(f, "Finished: {}", view.end_time)?;
        if view.expired {
            writeln!(f, "Submitted automatically when time ran out")?;
        }
        for row in &view.questions {
            let mark = if row.correct { "correct" } else { "incorrect" };
            writeln!(f, "- {} [{}/{}] {}", row.label, row.awarded, row.points, mark)?;
            if let Some(answer) = &row.correct_answer {
                writeln!(f, "    answer: {answer}")?;
            }
            if let Some(explanation) = &row.explanation {
                writeln!(f, "    {explanation}")?;
            }
        }
        Ok(())
    }
}
