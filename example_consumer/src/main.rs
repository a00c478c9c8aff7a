//! Example consumer: a service wired from the JSON files in `config/`.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! With `DATABASE_URL` set the Postgres store is used (tables are created if missing);
//! otherwise rows live in memory.

use entity_api_sdk::{
    build_router, ensure_tables, load_from_dir, ApiResult, AppError, AppState, HandlerRegistry, MemoryStore,
    MetadataResolver, PgStore, SchemaModel, Settings, Store,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

fn handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .register_fn("Ping", |_req| async { Ok::<_, AppError>(ApiResult::ok(json!("pong"))) })
        .register_fn("RefundPayment", |req| async move {
            let Some(key) = req.key else {
                return Ok::<_, AppError>(ApiResult::failed("payment key required"));
            };
            match req.store.find("Payment", &key).await? {
                Some(payment) => {
                    tracing::info!(payment = %key, "refund requested");
                    Ok(ApiResult::ok(serde_json::Value::Object(payment)))
                }
                None => Ok(ApiResult::not_found(format!("payment {} not found", key))),
            }
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("entity_api_sdk=info,example_consumer=info")),
        )
        .init();
    let settings = Settings::load()?;

    let config_dir = settings
        .config_dir
        .clone()
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/config").to_string());
    let config = load_from_dir(&config_dir)?;
    let schema = Arc::new(SchemaModel::from_config(&config.schema)?);

    let store: Arc<dyn Store> = match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            ensure_tables(&pool, &schema, &settings.database_schema).await?;
            Arc::new(PgStore::new(pool, schema.clone(), settings.database_schema.clone()))
        }
        None => {
            tracing::info!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new(schema.clone()))
        }
    };

    let model = MetadataResolver::from_settings(&settings).resolve_with_schema(&config.declarations, &schema)?;
    let state = AppState::new(store, model, handlers(), settings.naming);
    let app = build_router(state, &settings)?;

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
