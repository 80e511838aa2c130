// src/handlers/response.rs

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    models::{
        answer::AnswerValue,
        form::FormDefinition,
        submission::{ScoreSummary, StoredResponse, SubmitRequest, SubmitResponse},
    },
    scoring::{self, ScoreReport},
    session::identity::IdentityGate,
    store::FormStore,
};

/// Checks a submission against the form and scores it.
///
/// * The form must be inside its availability window.
/// * Identity must satisfy the form's requirements.
/// * `durationMs` may not exceed the time budget plus `grace_ms`.
/// * Every answer must target a known field, once, with the right shape.
/// * Required fields must be answered unless the attempt used the whole budget.
fn evaluate_submission(
    form: &FormDefinition,
    req: &SubmitRequest,
    now: DateTime<Utc>,
    grace_ms: i64,
) -> Result<(BTreeMap<String, AnswerValue>, ScoreReport), AppError> {
    if !form.settings.is_open_at(now) {
        return Err(AppError::Unprocessable(
            "Form is not accepting responses".to_string(),
        ));
    }

    IdentityGate::new(form.settings.identity)
        .verify(&req.responder)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if req.duration_ms < 0 {
        return Err(AppError::BadRequest("durationMs cannot be negative".to_string()));
    }
    if req.started_at > now + chrono::Duration::milliseconds(grace_ms) {
        return Err(AppError::BadRequest("startedAt is in the future".to_string()));
    }

    let budget = form.settings.budget_ms();
    if let Some(budget) = budget {
        if req.duration_ms > budget + grace_ms {
            return Err(AppError::Unprocessable(format!(
                "Duration {}ms exceeds the time limit of {}ms",
                req.duration_ms, budget
            )));
        }
    }

    let mut answers = BTreeMap::new();
    for submitted in &req.answers {
        let field = form.field(&submitted.field_id).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown field '{}'", submitted.field_id))
        })?;

        let value = AnswerValue::from_wire(field.field_type, &submitted.value)
            .map_err(|e| AppError::BadRequest(format!("Field '{}': {}", field.id, e)))?;

        let labels: Vec<&String> = match &value {
            AnswerValue::Choice(label) => vec![label],
            AnswerValue::Choices(labels) => labels.iter().collect(),
            _ => Vec::new(),
        };
        if let Some(unknown) = labels.into_iter().find(|l| !field.options.contains(l)) {
            return Err(AppError::BadRequest(format!(
                "Field '{}' has no option '{}'",
                field.id, unknown
            )));
        }

        if answers.insert(field.id.clone(), value).is_some() {
            return Err(AppError::BadRequest(format!(
                "Field '{}' answered more than once",
                field.id
            )));
        }
    }

    let used_whole_budget = budget.is_some_and(|b| req.duration_ms >= b);
    if !used_whole_budget {
        let missing: Vec<&str> = form
            .fields
            .iter()
            .filter(|f| f.required)
            .filter(|f| answers.get(&f.id).is_none_or(AnswerValue::is_empty))
            .map(|f| f.id.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Required fields unanswered: {}",
                missing.join(", ")
            )));
        }
    }

    let report = scoring::score(form, &answers);
    Ok((answers, report))
}

/// The submit endpoint.
///
/// Scores the attempt server-side, stores it and answers with the
/// `{ success, data: { score, maxScore } }` envelope.
pub async fn submit_response(
    State(store): State<Arc<dyn FormStore>>,
    State(config): State<Config>,
    Path(form_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let form = store
        .get_form(form_id)
        .await?
        .ok_or(AppError::NotFound("Form not found".to_string()))?;

    let now = Utc::now();
    let (_, report) = evaluate_submission(&form, &req, now, config.duration_grace_ms)?;

    let stored = StoredResponse {
        id: Uuid::new_v4(),
        form_id,
        responder: req.responder,
        started_at: req.started_at,
        duration_ms: req.duration_ms,
        answers: req.answers,
        score: report.score,
        max_score: report.max_score,
        fields: report.fields,
        created_at: now,
    };
    store.save_response(&stored).await?;

    tracing::info!(
        form_id = %form_id,
        response_id = %stored.id,
        score = stored.score,
        max_score = stored.max_score,
        "Response recorded"
    );

    Ok(Json(SubmitResponse::ok(ScoreSummary {
        score: stored.score,
        max_score: stored.max_score,
    })))
}

/// Lists stored responses for a form.
pub async fn list_responses(
    State(store): State<Arc<dyn FormStore>>,
    Path(form_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if store.get_form(form_id).await?.is_none() {
        return Err(AppError::NotFound("Form not found".to_string()));
    }
    let responses = store.list_responses(form_id).await?;
    Ok(Json(responses))
}
