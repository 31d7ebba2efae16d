//! ClosetMind core - routing, context extraction, and prompt composition
//!
//! This crate holds the pure, deterministic half of the chat backend:
//!
//! 1. **Routing** (`routing`) - keyword-trigger classification of a free-text
//!    message into search/outfit/general with a fixed priority tie-break
//! 2. **Context extraction** (`context`) - heuristic hints (budget ceiling,
//!    excluded brands, formality bias) over a bounded conversation window
//! 3. **Prompt composition** (`prompt`) - deterministic assembly of the
//!    augmented prompt handed to a responder
//! 4. **Domain types** (`domain`) - conversations, turns, and the
//!    category-tagged result variants persisted on every assistant turn
//!
//! Everything async (persistence, generation, resource leases, the
//! coordinator) lives in the `closetmind-db` and `closetmind-agent` crates;
//! nothing here touches a socket or a database.

pub mod config;
pub mod context;
pub mod domain;
pub mod prompt;
pub mod routing;

pub use context::{
    BudgetAdjustment, BudgetHint, CategoryHints, ContextExtractor, ContextWindow, ExtractorConfig,
    FormalityBias, HintEntry, DEFAULT_WINDOW_TURNS,
};
pub use domain::chat::{
    derive_title, Conversation, ConversationId, NewTurn, Turn, TurnId, TurnRole, UserId,
};
pub use domain::response::{
    AgentReply, AgentResult, GeneralReply, Outfit, OutfitPiece, Product, ProductList, ShapeError,
    MAX_PRODUCTS,
};
pub use prompt::PromptComposer;
pub use routing::{route, RouteCategory, RoutingDecision};
