// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        form::FormDefinition,
        identity::ResponderIdentity,
        submission::{StoredResponse, SubmittedAnswer},
    },
    scoring::FieldOutcome,
    store::FormStore,
};

/// Row of the `form_responses` table.
#[derive(Debug, FromRow)]
struct ResponseRow {
    id: Uuid,
    form_id: Uuid,
    responder: Json<ResponderIdentity>,
    started_at: DateTime<Utc>,
    duration_ms: i64,
    answers: Json<Vec<SubmittedAnswer>>,
    score: i64,
    max_score: i64,
    fields: Json<Vec<FieldOutcome>>,
    created_at: DateTime<Utc>,
}

impl From<ResponseRow> for StoredResponse {
    fn from(row: ResponseRow) -> Self {
        StoredResponse {
            id: row.id,
            form_id: row.form_id,
            responder: row.responder.0,
            started_at: row.started_at,
            duration_ms: row.duration_ms,
            answers: row.answers.0,
            score: u32::try_from(row.score).unwrap_or(0),
            max_score: u32::try_from(row.max_score).unwrap_or(0),
            fields: row.fields.0,
            created_at: row.created_at,
        }
    }
}

/// Document-style storage on Postgres JSONB columns.
#[derive(Clone)]
pub struct PgFormStore {
    pool: PgPool,
}

impl PgFormStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl FormStore for PgFormStore {
    async fn insert_form(&self, form: &FormDefinition) -> Result<(), AppError> {
        sqlx::query("INSERT INTO forms (id, title, definition) VALUES ($1, $2, $3)")
            .bind(form.id)
            .bind(&form.title)
            .bind(Json(form))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db) = &e {
                    if db.is_unique_violation() {
                        return AppError::Conflict(format!("Form '{}' already exists", form.id));
                    }
                }
                tracing::error!("Failed to insert form: {:?}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    async fn get_form(&self, id: Uuid) -> Result<Option<FormDefinition>, AppError> {
        let row: Option<(Json<FormDefinition>,)> =
            sqlx::query_as("SELECT definition FROM forms WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to fetch form: {:?}", e);
                    AppError::InternalServerError(e.to_string())
                })?;

        Ok(row.map(|(definition,)| definition.0))
    }

    async fn save_response(&self, response: &StoredResponse) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO form_responses
                (id, form_id, responder, started_at, duration_ms, answers, score, max_score, fields, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(response.id)
        .bind(response.form_id)
        .bind(Json(&response.responder))
        .bind(response.started_at)
        .bind(response.duration_ms)
        .bind(Json(&response.answers))
        .bind(i64::from(response.score))
        .bind(i64::from(response.max_score))
        .bind(Json(&response.fields))
        .bind(response.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save response: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
        Ok(())
    }

    async fn list_responses(&self, form_id: Uuid) -> Result<Vec<StoredResponse>, AppError> {
        let rows: Vec<ResponseRow> = sqlx::query_as(
            r#"
            SELECT id, form_id, responder, started_at, duration_ms, answers, score, max_score, fields, created_at
            FROM form_responses
            WHERE form_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list responses: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(rows.into_iter().map(StoredResponse::from).collect())
    }
}
