//! Thin conversation routes over the coordinator.
//!
//! Send-message is the coordinator's external entry point; everything else is
//! bookkeeping around conversation lifecycle. Authentication and the catalog
//! CRUD surface live outside this service.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use closetmind_agent::{Coordinator, CoordinatorError};
use closetmind_core::domain::chat::{Conversation, ConversationId, Turn, UserId};
use closetmind_db::{HistoryStore, RepositoryError};

#[derive(Clone)]
pub struct ChatState {
    pub history: Arc<dyn HistoryStore>,
    pub coordinator: Arc<Coordinator>,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/conversations", post(create_conversation))
        .route("/conversations/{id}", get(get_conversation).delete(delete_conversation))
        .route("/conversations/{id}/turns", get(list_turns).post(send_message))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    EmptyMessage,
    Busy(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "conversation not found".to_string()),
            Self::EmptyMessage => {
                (StatusCode::UNPROCESSABLE_ENTITY, "message must not be empty".to_string())
            }
            Self::Busy(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            Self::Internal(detail) => {
                error!(event_name = "ingress.chat.internal_error", detail = %detail, "chat request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::ConversationNotFound(_) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(error: CoordinatorError) -> Self {
        match error {
            CoordinatorError::ResourceExhausted(exhausted) => {
                Self::Busy(format!("service busy, retry shortly: {exhausted}"))
            }
            CoordinatorError::History(RepositoryError::ConversationNotFound(_)) => Self::NotFound,
            CoordinatorError::History(other) => Self::Internal(other.to_string()),
            CoordinatorError::Encode(other) => Self::Internal(other.to_string()),
        }
    }
}

pub async fn create_conversation(
    State(state): State<ChatState>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let title = request
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "New chat".to_string());

    let conversation =
        state.history.create_conversation(&title, request.user_id.map(UserId)).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<ChatState>,
    Path(id): Path<i64>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation =
        state.history.find_conversation(ConversationId(id)).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(conversation))
}

pub async fn list_turns(
    State(state): State<ChatState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Turn>>, ApiError> {
    let id = ConversationId(id);
    state.history.find_conversation(id).await?.ok_or(ApiError::NotFound)?;
    let turns = state.history.all(id).await?;
    Ok(Json(turns))
}

pub async fn send_message(
    State(state): State<ChatState>,
    Path(id): Path<i64>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Turn>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    let id = ConversationId(id);
    state.history.find_conversation(id).await?.ok_or(ApiError::NotFound)?;

    let assistant_turn = state.coordinator.handle(id, &request.message).await?;
    Ok(Json(assistant_turn))
}

pub async fn delete_conversation(
    State(state): State<ChatState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.history.delete_conversation(ConversationId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
