// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! RevOS API Server
//!
//! Student assistant backend: syllabus ingestion, question answering, and
//! calendar and bank integrations.

use revos_server::{config::Config, db::Database, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting RevOS API");

    // Open the SQLite database and create tables
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!(url = %config.database_url, "Database ready");

    let state = AppState::new(config.clone(), db)?;
    tracing::info!(
        openai = config.openai_configured(),
        pinecone = config.pinecone_configured(),
        google_calendar = config.google_configured(),
        plaid = config.plaid_configured(),
        "Integrations initialized"
    );

    // Build router
    let app = revos_server::routes::create_router(Arc::new(state));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("revos_server=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
