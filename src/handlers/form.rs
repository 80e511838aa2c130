// src/handlers/form.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, models::form::FormDefinition, store::FormStore, utils::html::clean_html};

/// Returns a form without its answer key.
pub async fn get_form(
    State(store): State<Arc<dyn FormStore>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let form = store
        .get_form(id)
        .await?
        .ok_or(AppError::NotFound("Form not found".to_string()))?;

    Ok(Json(form.to_public()))
}

/// Creates a form.
///
/// * Sanitizes every piece of author-supplied text.
/// * Validates the sanitized structure (unique field ids and option labels,
///   options for choice fields, key indices in range, point caps).
/// * Returns 201 Created with the form id.
pub async fn create_form(
    State(store): State<Arc<dyn FormStore>>,
    Json(payload): Json<FormDefinition>,
) -> Result<impl IntoResponse, AppError> {
    let form = sanitize(payload);
    form.validate()?;

    store.insert_form(&form).await?;
    tracing::info!(form_id = %form.id, fields = form.fields.len(), "Form created");

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": form.id }))))
}

/// Cleans HTML out of titles, labels, options and explanations.
pub fn sanitize(mut form: FormDefinition) -> FormDefinition {
    form.title = clean_html(&form.title);
    for field in &mut form.fields {
        field.label = clean_html(&field.label);
        for option in &mut field.options {
            *option = clean_html(option);
        }
        if let Some(quiz) = &mut field.quiz {
            quiz.explanation = clean_html(&quiz.explanation);
        }
    }
    form
}

/// Loads seed forms at startup, skipping ones that already exist.
pub async fn seed_forms(store: &dyn FormStore, forms: Vec<FormDefinition>) -> Result<usize, AppError> {
    let mut inserted = 0;
    for form in forms.into_iter().map(sanitize) {
        if let Err(errors) = form.validate() {
            tracing::warn!("Skipping invalid seed form '{}': {}", form.title, errors);
            continue;
        }
        match store.insert_form(&form).await {
            Ok(()) => inserted += 1,
            Err(AppError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(inserted)
}
