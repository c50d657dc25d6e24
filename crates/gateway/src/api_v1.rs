//! HTTP API v1: conversation threads.
//!
//! Endpoints:
//!
//! - `GET  /v1/threads` - List known threads
//! - `POST /v1/threads/{thread_id}/turns` - Send a message, run one turn
//! - `GET  /v1/threads/{thread_id}/messages` - Stored history of a thread
//!
//! Every request must carry the caller's credential in the `Authorization`
//! header; missing or blank tokens get a 401. On turns the credential is
//! forwarded to the pantry and recipe services.

use std::collections::HashMap;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use freshmate_agent::{AbortReason, TurnOutcome, TurnRequest};
use freshmate_core::{ApiError, AuthContext, Error, ErrorKind, Message, ThreadId, ThreadSummary};

use crate::SharedState;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/threads", get(list_threads_handler))
        .route("/threads/{thread_id}/turns", post(turn_handler))
        .route("/threads/{thread_id}/messages", get(messages_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TurnBody {
    pub message: String,
    #[serde(default)]
    pub tool_call_budget: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TurnResponse {
    FinalAnswer(String),
    Aborted(AbortedBody),
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AbortedBody {
    pub code: String,
    pub message: String,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        match outcome {
            TurnOutcome::Finished { answer } => Self::FinalAnswer(answer),
            TurnOutcome::Aborted { reason } => Self::Aborted(AbortedBody::from(&reason)),
        }
    }
}

impl From<&AbortReason> for AbortedBody {
    fn from(reason: &AbortReason) -> Self {
        Self {
            code: reason.code().to_string(),
            message: reason.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub thread_id: String,
    pub count: usize,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ThreadSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadListResponse {
    pub threads: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_type: String,
}

/// Error returned by handlers, rendered as `{error, error_type}`.
pub struct HttpError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<ApiError> for HttpError {
    fn from(err: ApiError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Server | ErrorKind::Connection | ErrorKind::Unexpected => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self {
            status,
            body: ErrorBody {
                error: err.message().to_string(),
                error_type: err.kind().to_string(),
            },
        }
    }
}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        match err {
            Error::Api(api) => api.into(),
            other => {
                warn!(error = %other, "Request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: ErrorBody {
                        error: other.to_string(),
                        error_type: "internal_error".into(),
                    },
                }
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn auth_from(headers: &HeaderMap) -> Result<AuthContext, ApiError> {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    AuthContext::from_headers(&headers)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn turn_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TurnBody>,
) -> Result<Json<TurnResponse>, HttpError> {
    let auth = auth_from(&headers)?;
    info!(
        thread_id = %thread_id,
        message_len = body.message.len(),
        token = %auth.fingerprint(),
        "Turn requested"
    );

    let mut request = TurnRequest::new(ThreadId::from(thread_id), body.message, auth);
    request.tool_call_budget = body.tool_call_budget;

    let outcome = state.service.handle_turn(request).await?;
    Ok(Json(outcome.into()))
}

async fn messages_handler(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, HttpError> {
    let auth = auth_from(&headers)?;
    let thread = ThreadId::from(thread_id);
    debug!(thread_id = %thread, token = %auth.fingerprint(), "History requested");
    let messages = state
        .service
        .messages(&thread)
        .await
        .map_err(Error::from)?;
    let summary = state.service.summary(&thread).await.map_err(Error::from)?;
    Ok(Json(MessagesResponse {
        thread_id: thread.to_string(),
        count: messages.len(),
        messages,
        summary,
    }))
}

async fn list_threads_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ThreadListResponse>, HttpError> {
    auth_from(&headers)?;
    let threads: Vec<String> = state
        .service
        .threads()
        .await
        .map_err(Error::from)?
        .into_iter()
        .map(|t| t.to_string())
        .collect();
    Ok(Json(ThreadListResponse {
        count: threads.len(),
        threads,
    }))
}
