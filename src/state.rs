// src/state.rs

use std::sync::Arc;

use crate::{config::Config, store::FormStore};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FormStore>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<dyn FormStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
