// src/main.rs

use assessment::config::Config;
use assessment::handlers::form::seed_forms;
use assessment::models::form::FormDefinition;
use assessment::routes;
use assessment::state::AppState;
use assessment::store::{FormStore, MemoryFormStore, PgFormStore};
use assessment::utils::telemetry;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    // Initialize Tracing (Logging)
    let _guard = telemetry::init(&config);

    let store: Arc<dyn FormStore> = match &config.database_url {
        Some(url) => Arc::new(connect_postgres(url).await),
        None => {
            tracing::warn!("DATABASE_URL not set; responses are kept in memory only");
            Arc::new(MemoryFormStore::new())
        }
    };

    if let Some(path) = &config.forms_seed {
        if let Err(e) = load_seed(store.as_ref(), path).await {
            tracing::error!("Failed to seed forms from {}: {}", path, e);
        }
    }

    let state = AppState {
        store,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.unwrap();

    // Start the server
    axum::serve(listener, app).await.unwrap();
}

/// Connects with retry and runs migrations.
async fn connect_postgres(url: &str) -> PgFormStore {
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    let store = PgFormStore::new(pool);
    tracing::info!("Running migrations...");
    store
        .migrate()
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");
    store
}

async fn load_seed(store: &dyn FormStore, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let forms: Vec<FormDefinition> = serde_json::from_str(&raw)?;
    let inserted = seed_forms(store, forms).await?;
    tracing::info!("Seeded {} form(s) from {}", inserted, path);
    Ok(())
}
