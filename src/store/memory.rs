// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{form::FormDefinition, submission::StoredResponse},
    store::FormStore,
};

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryFormStore {
    forms: RwLock<HashMap<Uuid, FormDefinition>>,
    responses: RwLock<HashMap<Uuid, Vec<StoredResponse>>>,
}

impl MemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FormStore for MemoryFormStore {
    async fn insert_form(&self, form: &FormDefinition) -> Result<(), AppError> {
        let mut forms = self.forms.write().await;
        if forms.contains_key(&form.id) {
            return Err(AppError::Conflict(format!("Form '{}' already exists", form.id)));
        }
        forms.insert(form.id, form.clone());
        Ok(())
    }

    async fn get_form(&self, id: Uuid) -> Result<Option<FormDefinition>, AppError> {
        Ok(self.forms.read().await.get(&id).cloned())
    }

    async fn save_response(&self, response: &StoredResponse) -> Result<(), AppError> {
        self.responses
            .write()
            .await
            .entry(response.form_id)
            .or_default()
            .push(response.clone());
        Ok(())
    }

    async fn list_responses(&self, form_id: Uuid) -> Result<Vec<StoredResponse>, AppError> {
        Ok(self
            .responses
            .read()
            .await
            .get(&form_id)
            .cloned()
            .unwrap_or_default())
    }
}
