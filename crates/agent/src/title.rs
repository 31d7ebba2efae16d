//! Background conversation-title generation.
//!
//! Titles are a nicety, not a request dependency: generation runs as
//! background-dispatched work under the background lease pool, and every
//! failure path degrades to the deterministic first-words heuristic instead
//! of surfacing an error.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use closetmind_core::domain::chat::{derive_title, ConversationId};
use closetmind_db::HistoryStore;

use crate::guard::{LeaseKind, ResourceExhausted, ResourceGuard};
use crate::llm::{GenerationBackend, GenerationError};

const TITLE_INSTRUCTIONS: &str = "\
Produce a very short chat title (1-3 words, no quotes) capturing the essence \
of the user message. Reply with the title text only.";

const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, Error)]
enum TitleError {
    #[error(transparent)]
    Lease(#[from] ResourceExhausted),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub struct TitleGenerator {
    backend: Arc<dyn GenerationBackend>,
    guard: Arc<ResourceGuard>,
    history: Arc<dyn HistoryStore>,
}

impl TitleGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        guard: Arc<ResourceGuard>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self { backend, guard, history }
    }

    /// Generate a title from the first user message and persist it. Intended
    /// to run in a spawned task; logs instead of failing.
    pub async fn refresh(&self, conversation_id: ConversationId, first_message: &str) {
        let title = self.generate(first_message).await;

        match self.guard.acquire(LeaseKind::DbSession).await {
            Ok(_lease) => {
                if let Err(error) = self.history.update_title(conversation_id, &title).await {
                    warn!(
                        event_name = "agent.title.persist_failed",
                        conversation_id = conversation_id.0,
                        error = %error,
                        "could not persist generated title"
                    );
                }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.title.lease_unavailable",
                    conversation_id = conversation_id.0,
                    error = %error,
                    "skipping title persistence, background pool saturated"
                );
            }
        }
    }

    /// LLM title with heuristic fallback; never errors.
    pub async fn generate(&self, first_message: &str) -> String {
        match self.generate_with_backend(first_message).await {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => derive_title(first_message),
            Err(error) => {
                debug!(
                    event_name = "agent.title.fallback",
                    error = %error,
                    "title generation degraded to heuristic"
                );
                derive_title(first_message)
            }
        }
    }

    async fn generate_with_backend(&self, first_message: &str) -> Result<String, TitleError> {
        let _lease = self.guard.acquire(LeaseKind::Generation).await?;
        let raw = self
            .backend
            .generate(&format!("{TITLE_INSTRUCTIONS}\n\nUser message: {first_message}"), &[])
            .await?;

        let title = raw.trim().trim_matches('"').trim_matches('\'').trim();
        Ok(title.chars().take(MAX_TITLE_CHARS).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use closetmind_core::config::PoolLimits;
    use closetmind_db::{HistoryStore, InMemoryHistoryStore};

    use crate::guard::{LeaseKind, ResourceGuard};
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::GenerationError;

    use super::TitleGenerator;

    fn background_guard() -> Arc<ResourceGuard> {
        Arc::new(ResourceGuard::new(
            "background",
            PoolLimits { db_sessions: 2, generation_slots: 2 },
            Duration::from_millis(100),
        ))
    }

    #[tokio::test]
    async fn generated_title_is_persisted() {
        let store = Arc::new(InMemoryHistoryStore::default());
        let backend =
            Arc::new(ScriptedBackend::with_responses(vec![Ok("\"Black Tee Hunt\"".to_string())]));
        let titles =
            TitleGenerator::new(backend, background_guard(), Arc::clone(&store) as Arc<dyn HistoryStore>);

        let conversation =
            store.create_conversation("New chat", None).await.expect("create conversation");
        titles.refresh(conversation.id, "find a black t-shirt under $30").await;

        let reloaded = store
            .find_conversation(conversation.id)
            .await
            .expect("lookup")
            .expect("conversation exists");
        assert_eq!(reloaded.title, "Black Tee Hunt");
    }

    #[tokio::test]
    async fn backend_failure_degrades_to_the_heuristic() {
        let store = Arc::new(InMemoryHistoryStore::default());
        let backend = Arc::new(ScriptedBackend::with_responses(vec![Err(
            GenerationError::Unavailable("offline".to_string()),
        )]));
        let titles =
            TitleGenerator::new(backend, background_guard(), Arc::clone(&store) as Arc<dyn HistoryStore>);

        let title = titles.generate("find a black t-shirt under $30 for hiking trips").await;
        assert_eq!(title, "Find a black t shirt under");
    }

    #[tokio::test]
    async fn saturated_background_pool_degrades_to_the_heuristic() {
        let store = Arc::new(InMemoryHistoryStore::default());
        let backend = Arc::new(ScriptedBackend::with_responses(vec![Ok("LLM Title".to_string())]));
        let guard = Arc::new(ResourceGuard::new(
            "background",
            PoolLimits { db_sessions: 1, generation_slots: 1 },
            Duration::from_millis(20),
        ));
        let titles =
            TitleGenerator::new(backend, Arc::clone(&guard), Arc::clone(&store) as Arc<dyn HistoryStore>);

        let _held = guard.acquire(LeaseKind::Generation).await.expect("saturate pool");
        let title = titles.generate("what should I wear to the gallery opening").await;
        assert_eq!(title, "What should I wear to the");
    }
}
