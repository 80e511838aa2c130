// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{form, response},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Form retrieval and creation under `/api/forms`.
/// * The submit endpoint at `/api/forms/{id}/responses`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let form_routes = Router::new()
        .route("/", post(form::create_form))
        .route("/{id}", get(form::get_form))
        .route(
            "/{id}/responses",
            post(response::submit_response).get(response::list_responses),
        );

    Router::new()
        .nest("/api/forms", form_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
