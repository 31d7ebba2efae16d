use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    Search,
    Outfit,
    General,
}

impl RouteCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Outfit => "outfit",
            Self::General => "general",
        }
    }
}

/// Routing outcome plus the rule that produced it. The rule identifier is
/// observability-only and never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    pub category: RouteCategory,
    pub rule: &'static str,
}

/// Multi-word triggers are matched as substrings of the normalized message;
/// single words are matched against whole tokens so "shop" does not fire on
/// "workshop".
const SEARCH_PHRASES: &[&str] = &["where to buy", "looking for", "how much is"];
const SEARCH_WORDS: &[&str] = &[
    "find", "buy", "search", "shop", "shopping", "item", "purchase", "price", "cost", "cheap",
    "cheaper", "expensive", "pricier", "order",
];

const OUTFIT_PHRASES: &[&str] = &["what to wear", "what should i wear", "dress me"];
const OUTFIT_WORDS: &[&str] = &[
    "outfit", "wear", "style", "styling", "stylish", "wardrobe", "clothing", "clothes", "dress",
    "formal", "casual", "dressy", "look",
];

/// Total, deterministic, stateless routing. Category priority on ambiguous
/// messages is fixed: search > outfit > general.
pub fn route(message: &str) -> RoutingDecision {
    let normalized = message.to_lowercase();
    let tokens = word_tokens(&normalized);

    if let Some(rule) = match_triggers(&normalized, &tokens, SEARCH_PHRASES, SEARCH_WORDS) {
        return RoutingDecision { category: RouteCategory::Search, rule };
    }
    if let Some(rule) = match_triggers(&normalized, &tokens, OUTFIT_PHRASES, OUTFIT_WORDS) {
        return RoutingDecision { category: RouteCategory::Outfit, rule };
    }

    RoutingDecision { category: RouteCategory::General, rule: "default" }
}

fn match_triggers(
    normalized: &str,
    tokens: &[&str],
    phrases: &'static [&'static str],
    words: &'static [&'static str],
) -> Option<&'static str> {
    if let Some(phrase) = phrases.iter().find(|phrase| normalized.contains(**phrase)) {
        return Some(*phrase);
    }
    words.iter().find(|word| tokens.contains(*word)).copied()
}

fn word_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect()
}
