//! Category responders over the generation backend.
//!
//! Each responder pairs an instruction template with its output-shape
//! contract. Responders never see raw user input - only the augmented prompt
//! composed by the coordinator - and return exactly one category-tagged
//! result variant after parsing and normalizing the backend's text.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use closetmind_core::domain::chat::Turn;
use closetmind_core::domain::response::{
    AgentResult, GeneralReply, Outfit, ProductList, ShapeError,
};
use closetmind_core::routing::RouteCategory;

use crate::llm::{GenerationBackend, GenerationError};

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("{category} response failed shape validation: {reason}")]
    Validation { category: &'static str, reason: String },
}

impl ResponderError {
    fn validation(category: RouteCategory, reason: impl ToString) -> Self {
        Self::Validation { category: category.as_str(), reason: reason.to_string() }
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    fn category(&self) -> RouteCategory;

    async fn respond(
        &self,
        augmented_prompt: &str,
        prior_history: &[Turn],
    ) -> Result<AgentResult, ResponderError>;
}

const SEARCH_INSTRUCTIONS: &str = "\
You are a product search specialist. Analyze the request and answer with a \
single JSON object of this exact shape:
{\"products\": [{\"name\": \"...\", \"price\": \"...\", \"description\": \"...\", \
\"link\": \"...\", \"image_urls\": [], \"sizes\": [], \"colors\": [], \"in_stock\": true}], \
\"search_query\": \"...\", \"total_found\": 0}
Rules:
- price carries its currency symbol, or \"Price not found\" when absent
- descriptions are concise, at most 120 characters
- only include items that are actually for sale
- return an empty products list when nothing matches
- at most 10 products, most relevant first
Output the JSON object only, no prose.";

const OUTFIT_INSTRUCTIONS: &str = "\
You are a professional fashion stylist. Combine wardrobe pieces into one \
coherent recommendation and answer with a single JSON object of this exact \
shape:
{\"outfit_description\": \"...\", \"items\": [{\"name\": \"...\", \"category\": \"...\", \
\"image_url\": \"...\"}], \"reasoning\": \"...\"}
Rules:
- consider color coordination, style compatibility, and the occasion
- when no suitable items exist, say so in outfit_description and return an \
empty items list
- keep the tone encouraging and practical
Output the JSON object only, no prose.";

const GENERAL_INSTRUCTIONS: &str = "\
You are a helpful, friendly assistant. Answer the question accurately and \
concisely, and if the user is really asking for product search or outfit \
help, suggest they ask for that directly. Answer with a single JSON object of \
this exact shape:
{\"response\": \"...\"}
Output the JSON object only, no prose.";

pub struct SearchResponder {
    backend: Arc<dyn GenerationBackend>,
}

pub struct OutfitResponder {
    backend: Arc<dyn GenerationBackend>,
}

pub struct GeneralResponder {
    backend: Arc<dyn GenerationBackend>,
}

#[async_trait]
impl Responder for SearchResponder {
    fn category(&self) -> RouteCategory {
        RouteCategory::Search
    }

    async fn respond(
        &self,
        augmented_prompt: &str,
        prior_history: &[Turn],
    ) -> Result<AgentResult, ResponderError> {
        let raw = self
            .backend
            .generate(&with_instructions(SEARCH_INSTRUCTIONS, augmented_prompt), prior_history)
            .await?;
        let list: ProductList = parse_payload(&raw, self.category())?;
        let list = list.normalized().map_err(|error: ShapeError| {
            ResponderError::validation(self.category(), error)
        })?;
        Ok(AgentResult::Search(list))
    }
}

#[async_trait]
impl Responder for OutfitResponder {
    fn category(&self) -> RouteCategory {
        RouteCategory::Outfit
    }

    async fn respond(
        &self,
        augmented_prompt: &str,
        prior_history: &[Turn],
    ) -> Result<AgentResult, ResponderError> {
        let raw = self
            .backend
            .generate(&with_instructions(OUTFIT_INSTRUCTIONS, augmented_prompt), prior_history)
            .await?;
        let outfit: Outfit = parse_payload(&raw, self.category())?;
        let outfit = outfit.normalized().map_err(|error: ShapeError| {
            ResponderError::validation(self.category(), error)
        })?;
        Ok(AgentResult::Outfit(outfit))
    }
}

#[async_trait]
impl Responder for GeneralResponder {
    fn category(&self) -> RouteCategory {
        RouteCategory::General
    }

    async fn respond(
        &self,
        augmented_prompt: &str,
        prior_history: &[Turn],
    ) -> Result<AgentResult, ResponderError> {
        let raw = self
            .backend
            .generate(&with_instructions(GENERAL_INSTRUCTIONS, augmented_prompt), prior_history)
            .await?;
        let reply: GeneralReply = parse_payload(&raw, self.category())?;
        let reply = reply.normalized().map_err(|error: ShapeError| {
            ResponderError::validation(self.category(), error)
        })?;
        Ok(AgentResult::General(reply))
    }
}

/// The three category adapters behind one lookup.
pub struct ResponderPool {
    search: SearchResponder,
    outfit: OutfitResponder,
    general: GeneralResponder,
}

impl ResponderPool {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            search: SearchResponder { backend: Arc::clone(&backend) },
            outfit: OutfitResponder { backend: Arc::clone(&backend) },
            general: GeneralResponder { backend },
        }
    }

    pub fn responder_for(&self, category: RouteCategory) -> &dyn Responder {
        match category {
            RouteCategory::Search => &self.search,
            RouteCategory::Outfit => &self.outfit,
            RouteCategory::General => &self.general,
        }
    }
}

fn with_instructions(instructions: &str, augmented_prompt: &str) -> String {
    format!("{instructions}\n\n{augmented_prompt}")
}

/// Model output frequently arrives wrapped in markdown fences; strip them
/// before parsing.
fn parse_payload<T: serde::de::DeserializeOwned>(
    raw: &str,
    category: RouteCategory,
) -> Result<T, ResponderError> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|body| body.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(unfenced).map_err(|error| ResponderError::validation(category, error))
}
