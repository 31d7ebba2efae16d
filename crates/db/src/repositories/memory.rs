use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use closetmind_core::domain::chat::{
    Conversation, ConversationId, NewTurn, Turn, TurnId, UserId,
};

use super::{HistoryStore, RepositoryError};

/// History store double backed by maps, for tests and offline tooling.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    next_conversation_id: i64,
    next_turn_id: i64,
    conversations: HashMap<i64, Conversation>,
    turns: HashMap<i64, Vec<Turn>>,
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create_conversation(
        &self,
        title: &str,
        user_id: Option<UserId>,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.state.write().await;
        state.next_conversation_id += 1;
        let conversation = Conversation {
            id: ConversationId(state.next_conversation_id),
            title: title.to_string(),
            user_id,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.conversations.insert(conversation.id.0, conversation.clone());
        state.turns.insert(conversation.id.0, Vec::new());
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.conversations.get(&id.0).cloned())
    }

    async fn update_title(&self, id: ConversationId, title: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&id.0)
            .ok_or(RepositoryError::ConversationNotFound(id))?;
        conversation.title = title.to_string();
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.conversations.remove(&id.0).is_none() {
            return Err(RepositoryError::ConversationNotFound(id));
        }
        state.turns.remove(&id.0);
        Ok(())
    }

    async fn append(
        &self,
        conversation_id: ConversationId,
        turn: NewTurn,
    ) -> Result<Turn, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&conversation_id.0) {
            return Err(RepositoryError::ConversationNotFound(conversation_id));
        }

        state.next_turn_id += 1;
        let created_at = Utc::now();
        let stored = Turn {
            id: TurnId(state.next_turn_id),
            conversation_id,
            role: turn.role,
            content: turn.content,
            created_at,
        };

        if let Some(conversation) = state.conversations.get_mut(&conversation_id.0) {
            conversation.updated_at = Some(created_at);
        }
        state.turns.entry(conversation_id.0).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let state = self.state.read().await;
        let turns = state.turns.get(&conversation_id.0).cloned().unwrap_or_default();
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.into_iter().skip(skip).collect())
    }

    async fn all(&self, conversation_id: ConversationId) -> Result<Vec<Turn>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.turns.get(&conversation_id.0).cloned().unwrap_or_default())
    }
}
