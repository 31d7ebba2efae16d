//! Request orchestration: the single entry point external callers use.
//!
//! Within one conversation, turn appends are serialized by a per-conversation
//! mutex; independent conversations run concurrently. The generation lease is
//! taken before any turn is written, so a saturated pool surfaces as
//! service-busy without leaving a half-completed turn pair behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use uuid::Uuid;

use closetmind_core::config::AgentConfig;
use closetmind_core::context::{ContextExtractor, ContextWindow, ExtractorConfig};
use closetmind_core::domain::chat::{ConversationId, NewTurn, Turn};
use closetmind_core::domain::response::{AgentReply, AgentResult};
use closetmind_core::prompt::PromptComposer;
use closetmind_core::routing::route;
use closetmind_db::HistoryStore;

use crate::error::CoordinatorError;
use crate::guard::{LeaseKind, ResourceGuard};
use crate::llm::GenerationBackend;
use crate::responders::ResponderPool;
use crate::title::TitleGenerator;

pub struct Coordinator {
    history: Arc<dyn HistoryStore>,
    responders: ResponderPool,
    extractor: ContextExtractor,
    composer: PromptComposer,
    guard: Arc<ResourceGuard>,
    titles: Option<Arc<TitleGenerator>>,
    window_turns: usize,
    max_attempts: u32,
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        backend: Arc<dyn GenerationBackend>,
        guard: Arc<ResourceGuard>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            history,
            responders: ResponderPool::new(backend),
            extractor: ContextExtractor::new(ExtractorConfig {
                budget_adjust_pct: config.budget_adjust_pct,
            }),
            composer: PromptComposer,
            guard,
            titles: None,
            window_turns: config.context_window_turns,
            max_attempts: config.max_response_attempts,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Enable background conversation-title generation on first message.
    pub fn with_title_generator(mut self, titles: Arc<TitleGenerator>) -> Self {
        self.titles = Some(titles);
        self
    }

    /// Handle one inbound message: route, enrich, generate, persist. Appends
    /// exactly two turns (user, assistant) on every completed call, fallback
    /// included.
    pub async fn handle(
        &self,
        conversation_id: ConversationId,
        user_message: &str,
    ) -> Result<Turn, CoordinatorError> {
        let correlation_id = Uuid::new_v4().to_string();

        let turn_order = self.conversation_lock(conversation_id);
        let _turn_order = turn_order.lock().await;

        // Taken before any write so pool saturation fails the request while
        // the conversation is still untouched.
        let generation_lease = self.guard.acquire(LeaseKind::Generation).await?;

        let (window, prior_history) = {
            let _lease = self.guard.acquire(LeaseKind::DbSession).await?;
            self.history.append(conversation_id, NewTurn::user(user_message)).await?;
            let turns = self.history.all(conversation_id).await?;
            let prior = turns[..turns.len().saturating_sub(1)].to_vec();
            let window = ContextWindow::of_last(turns, self.window_turns);
            (window, prior)
        };

        if prior_history.is_empty() {
            if let Some(titles) = &self.titles {
                let titles = Arc::clone(titles);
                let first_message = user_message.to_string();
                tokio::spawn(async move {
                    titles.refresh(conversation_id, &first_message).await;
                });
            }
        }

        let decision = route(user_message);
        let hints = self.extractor.extract(&window, decision.category);
        let augmented_prompt = self.composer.compose(user_message, &hints, decision.category);

        info!(
            event_name = "agent.coordinator.routed",
            correlation_id = %correlation_id,
            conversation_id = conversation_id.0,
            category = decision.category.as_str(),
            rule = decision.rule,
            hint_count = hints.entries().len(),
            "routed inbound message"
        );

        let responder = self.responders.responder_for(decision.category);
        let mut produced = None;
        for attempt in 1..=self.max_attempts {
            match responder.respond(&augmented_prompt, &prior_history).await {
                Ok(result) => {
                    produced = Some(result);
                    break;
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.coordinator.attempt_failed",
                        correlation_id = %correlation_id,
                        conversation_id = conversation_id.0,
                        category = decision.category.as_str(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "responder attempt failed"
                    );
                }
            }
        }
        drop(generation_lease);

        let fallback_used = produced.is_none();
        let result = produced
            .unwrap_or_else(|| AgentResult::fallback_for(decision.category, user_message));
        let content = AgentReply::new(result).to_content()?;

        let assistant_turn = {
            let _lease = self.guard.acquire(LeaseKind::DbSession).await?;
            self.history.append(conversation_id, NewTurn::assistant(content)).await?
        };

        info!(
            event_name = "agent.coordinator.handled",
            correlation_id = %correlation_id,
            conversation_id = conversation_id.0,
            category = decision.category.as_str(),
            fallback = fallback_used,
            "persisted assistant turn"
        );

        Ok(assistant_turn)
    }

    fn conversation_lock(&self, conversation_id: ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop entries nobody outside the map is holding anymore.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(conversation_id.0)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
