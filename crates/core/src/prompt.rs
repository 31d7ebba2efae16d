use crate::context::CategoryHints;
use crate::routing::RouteCategory;

/// Deterministic prompt construction: category preamble, rendered hints,
/// the raw user message verbatim, and a closing instruction when hints are
/// present. Every non-empty hint entry appears in the output.
#[derive(Clone, Copy, Debug, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn compose(&self, raw_message: &str, hints: &CategoryHints, category: RouteCategory) -> String {
        let mut prompt = String::new();
        prompt.push_str(preamble(category));
        prompt.push_str("\n\n");

        let entries = hints.entries();
        if !entries.is_empty() {
            prompt.push_str("Context from earlier in this conversation:\n");
            for entry in &entries {
                prompt.push_str("- ");
                prompt.push_str(&entry.rendered);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str("User message: ");
        prompt.push_str(raw_message);

        if !entries.is_empty() {
            prompt.push_str(
                "\n\nHonor the context above unless the current message explicitly overrides it.",
            );
        }

        prompt
    }
}

fn preamble(category: RouteCategory) -> &'static str {
    match category {
        RouteCategory::Search => {
            "Handle this as a product search request: recommend concrete purchasable items that \
             match what the user is asking for."
        }
        RouteCategory::Outfit => {
            "Handle this as an outfit recommendation request: combine wardrobe pieces into a \
             coherent look for the user's occasion."
        }
        RouteCategory::General => {
            "Handle this as general conversation: answer helpfully and suggest product search or \
             outfit help only when the user asks for it."
        }
    }
}
