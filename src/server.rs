use crate::clock::Clock;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::ids::IdGenerator;
use crate::logging::{LogEntry, LogLevel, SharedLogger};
use crate::proxy;
use crate::translate::openai_types::{ChatCompletionRequest, ErrorResponse};
use crate::translate::relay::ResponseRelay;
use crate::translate::request::openai_to_native;
use crate::writer::response_channel;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const EMPTY_MESSAGES: &str = "[] is too short - 'messages'";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/health", get(handle_health))
        .route("/logs", get(handle_logs))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .warn("server", format!("Failed to parse request: {}", e));
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    if req.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, EMPTY_MESSAGES);
    }

    let payload = match serde_json::to_vec(&openai_to_native(&req)) {
        Ok(p) => p,
        Err(e) => {
            let err = ProxyError::translation(format!("Failed to encode backend request: {}", e));
            state.logger.error("server", err.to_string());
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let request_id = state.ids.next_id();
    state.logger.request(
        LogLevel::Info,
        &request_id,
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            req.stream,
            req.messages.len()
        ),
    );

    let (writer, head_rx, body) = response_channel();
    let mut relay = ResponseRelay::new(writer, req.stream, request_id.clone())
        .with_clock(Arc::clone(&state.clock));
    let stream = req.stream;
    let task_state = Arc::clone(&state);

    tokio::spawn(async move {
        let state = task_state;
        let result = proxy::forward_chat(
            payload,
            stream,
            &state.config,
            &state.client,
            &state.logger,
            &request_id,
            &mut relay,
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(request_id = %request_id, error = %e, "chat request failed");
        }
    });

    match head_rx.await {
        Ok(head) => head.into_response(body),
        Err(_) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "backend handler ended without a response",
        ),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let err = ErrorResponse::for_status(status.as_u16(), message);
    (status, Json(err)).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Json<Vec<LogEntry>> {
    Json(state.logger.recent(query.limit.unwrap_or(100)))
}
