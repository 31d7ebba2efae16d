//! Agent runtime - routing coordination over an opaque generation backend
//!
//! This crate orchestrates one chat request end to end:
//!
//! 1. **Coordination** (`coordinator`) - append the user turn, build the
//!    bounded context window, route, extract hints, compose the augmented
//!    prompt, invoke the matching responder, persist the result
//! 2. **Responders** (`responders`) - search/outfit/general adapters that wrap
//!    the generation backend with category instructions and output contracts
//! 3. **Resource guard** (`guard`) - bounded leases for database sessions and
//!    outbound generation calls, with separate interactive and background
//!    pools so neither can starve the other
//! 4. **Generation backend** (`llm`) - the pluggable text-completion seam and
//!    an HTTP client for OpenAI-compatible endpoints
//!
//! # Safety principle
//!
//! The generation backend never sees raw user input on its own: responders
//! only receive the coordinator-composed prompt, which is how conversation
//! context is actually injected into generation.

pub mod coordinator;
pub mod error;
pub mod guard;
pub mod llm;
pub mod responders;
pub mod title;

pub use coordinator::Coordinator;
pub use error::CoordinatorError;
pub use guard::{LeaseKind, ResourceExhausted, ResourceGuard, ResourceLease};
pub use llm::{GenerationBackend, GenerationError, HttpGenerationClient};
pub use responders::{Responder, ResponderError, ResponderPool};
pub use title::TitleGenerator;
