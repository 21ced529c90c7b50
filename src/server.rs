//! HTTP front end
//!
//! Chat messages arrive as `POST /command` with `{"content": "!detail 1"}` and
//! are answered with the embed the dispatcher built.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bot::{Dispatcher, Embed};

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub embed: Embed,
}

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/command", post(command))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

async fn command(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(payload): Json<CommandRequest>,
) -> Response {
    match dispatcher.handle(&payload.content).await {
        Some(embed) => Json(CommandReply { embed }).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}

pub async fn serve(listen: &str, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Listening on {}", listen);

    axum::serve(listener, router(dispatcher))
        .await
        .context("HTTP server stopped unexpectedly")
}
