// src/store/mod.rs

//! Persistence seam for forms and submitted responses.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{form::FormDefinition, submission::StoredResponse},
};

pub use memory::MemoryFormStore;
pub use postgres::PgFormStore;

#[async_trait]
pub trait FormStore: Send + Sync {
    /// Fails with `Conflict` if a form with the same id exists.
    async fn insert_form(&self, form: &FormDefinition) -> Result<(), AppError>;

    async fn get_form(&self, id: Uuid) -> Result<Option<FormDefinition>, AppError>;

    async fn save_response(&self, response: &StoredResponse) -> Result<(), AppError>;

    /// Responses for a form, oldest first.
    async fn list_responses(&self, form_id: Uuid) -> Result<Vec<StoredResponse>, AppError>;
}
