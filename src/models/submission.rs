// src/models/submission.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::{answer::AnswerValue, identity::ResponderIdentity},
    scoring::FieldOutcome,
    session::proctor::Violation,
};

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// One answer as sent to the submit endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub field_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_code: Option<String>,

    /// Scalar or array depending on the field type.
    pub value: Value,
}

/// Body of `POST /api/forms/{id}/responses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Not part of the body; used by clients to build the URL.
    #[serde(skip)]
    pub form_id: Uuid,

    #[serde(default)]
    pub responder: ResponderIdentity,

    pub started_at: DateTime<Utc>,

    pub duration_ms: i64,

    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub score: u32,
    pub max_score: u32,
}

/// Envelope returned by the submit endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ScoreSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResponse {
    pub fn ok(summary: ScoreSummary) -> Self {
        Self {
            success: true,
            data: Some(summary),
            error: None,
        }
    }
}

/// A response as kept by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
    pub id: Uuid,
    pub form_id: Uuid,
    pub responder: ResponderIdentity,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub answers: Vec<SubmittedAnswer>,
    pub score: u32,
    pub max_score: u32,
    pub fields: Vec<FieldOutcome>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a completed attempt, kept by the controller after submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub score: u32,
    pub max_score: u32,
    pub duration_ms: i64,
    pub answers: BTreeMap<String, AnswerValue>,
    pub fields: Vec<FieldOutcome>,
    pub violations: Vec<Violation>,
    /// True when the countdown ended the attempt.
    pub expired: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub start_time: String,
    pub end_time: String,
}

pub fn display_time(at: DateTime<Utc>) -> String {
    at.format(DISPLAY_FORMAT).to_string()
}
