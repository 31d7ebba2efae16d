use async_trait::async_trait;
use thiserror::Error;

use closetmind_core::domain::chat::{Conversation, ConversationId, NewTurn, Turn, UserId};

pub mod chat;
pub mod memory;

pub use chat::SqlHistoryStore;
pub use memory::InMemoryHistoryStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conversation not found: {0:?}")]
    ConversationNotFound(ConversationId),
}

/// Durable append-only log of per-conversation turns.
///
/// Implementations must preserve insertion order: `recent` returns at most
/// `limit` turns, most-recent-last, and `all` returns the full ordered
/// sequence. Turns are never updated or reordered; conversation deletion
/// cascades to its turns.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create_conversation(
        &self,
        title: &str,
        user_id: Option<UserId>,
    ) -> Result<Conversation, RepositoryError>;

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn update_title(&self, id: ConversationId, title: &str) -> Result<(), RepositoryError>;

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), RepositoryError>;

    async fn append(
        &self,
        conversation_id: ConversationId,
        turn: NewTurn,
    ) -> Result<Turn, RepositoryError>;

    async fn recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError>;

    async fn all(&self, conversation_id: ConversationId) -> Result<Vec<Turn>, RepositoryError>;
}
