//! Heuristic hint extraction over a bounded conversation window.
//!
//! Extraction is best-effort text matching, not inference: it scans recent
//! user turns for price mentions, brand negations, garment/color tokens, and
//! feedback phrases, and turns them into structured hints for the prompt
//! composer. Re-running on the same window always yields the same hints, and
//! a window with nothing to find yields an empty hint set.

use crate::domain::chat::{Turn, TurnRole};
use crate::routing::RouteCategory;

/// Default bounded-suffix length for hint extraction.
pub const DEFAULT_WINDOW_TURNS: usize = 6;

/// Derived, non-persisted suffix of a conversation, most-recent-last. The
/// final turn is the user message currently being handled; everything before
/// it is prior context.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextWindow {
    turns: Vec<Turn>,
}

impl ContextWindow {
    /// Keep only the last `limit` turns, preserving order.
    pub fn of_last(mut turns: Vec<Turn>, limit: usize) -> Self {
        if turns.len() > limit {
            turns.drain(..turns.len() - limit);
        }
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BudgetAdjustment {
    Lowered,
    Raised,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetHint {
    pub ceiling_cents: i64,
    pub adjustment: Option<BudgetAdjustment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormalityBias {
    LessFormal,
    MoreFormal,
}

/// One extracted hint-kind with its rendered prompt line. Every non-empty
/// entry must appear verbatim in the composed prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HintEntry {
    pub kind: &'static str,
    pub rendered: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CategoryHints {
    pub budget: Option<BudgetHint>,
    pub excluded_brands: Vec<String>,
    pub style_preferences: Vec<String>,
    pub garments: Vec<String>,
    pub colors: Vec<String>,
    pub formality: Option<FormalityBias>,
    pub comfort_issue: bool,
    pub topics: Vec<String>,
}

impl CategoryHints {
    pub fn is_empty(&self) -> bool {
        self.budget.is_none()
            && self.excluded_brands.is_empty()
            && self.style_preferences.is_empty()
            && self.garments.is_empty()
            && self.colors.is_empty()
            && self.formality.is_none()
            && !self.comfort_issue
            && self.topics.is_empty()
    }

    pub fn entries(&self) -> Vec<HintEntry> {
        let mut entries = Vec::new();

        if let Some(budget) = &self.budget {
            let suffix = match budget.adjustment {
                Some(BudgetAdjustment::Lowered) => " (adjusted lower after recent feedback)",
                Some(BudgetAdjustment::Raised) => " (adjusted higher after recent feedback)",
                None => "",
            };
            entries.push(HintEntry {
                kind: "budget_ceiling",
                rendered: format!(
                    "Previous budget ceiling: {}{suffix}",
                    format_cents(budget.ceiling_cents)
                ),
            });
        }
        if !self.excluded_brands.is_empty() {
            entries.push(HintEntry {
                kind: "excluded_brand",
                rendered: format!("Excluded brands: {}", self.excluded_brands.join(", ")),
            });
        }
        if !self.style_preferences.is_empty() {
            entries.push(HintEntry {
                kind: "style_preference",
                rendered: format!("Style preferences: {}", self.style_preferences.join(", ")),
            });
        }
        if !self.garments.is_empty() {
            entries.push(HintEntry {
                kind: "garment_focus",
                rendered: format!("Garments discussed earlier: {}", self.garments.join(", ")),
            });
        }
        if !self.colors.is_empty() {
            entries.push(HintEntry {
                kind: "color_focus",
                rendered: format!("Colors mentioned earlier: {}", self.colors.join(", ")),
            });
        }
        if let Some(bias) = self.formality {
            let rendered = match bias {
                FormalityBias::LessFormal => {
                    "Formality feedback: the previous suggestion was too formal, propose a more \
                     relaxed alternative"
                }
                FormalityBias::MoreFormal => {
                    "Formality feedback: the previous suggestion was too casual, propose a \
                     dressier alternative"
                }
            };
            entries.push(HintEntry { kind: "formality_bias", rendered: rendered.to_string() });
        }
        if self.comfort_issue {
            entries.push(HintEntry {
                kind: "comfort_bias",
                rendered: "Comfort feedback: prioritize comfortable pieces".to_string(),
            });
        }
        if !self.topics.is_empty() {
            entries.push(HintEntry {
                kind: "topic_keywords",
                rendered: format!("Recent topics: {}", self.topics.join(", ")),
            });
        }

        entries
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Percentage applied to the budget ceiling on "cheaper" / "more
    /// expensive" feedback. Only the direction is contractual.
    pub budget_adjust_pct: u8,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { budget_adjust_pct: 20 }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContextExtractor {
    config: ExtractorConfig,
}

const BRANDS: &[&str] =
    &["H&M", "Zara", "Nike", "Adidas", "Uniqlo", "Mango", "Levi's", "Gucci", "Bershka", "Reserved"];

const BRAND_NEGATIONS: &[&str] =
    &["different brand", "another brand", "not this one", "anything but", "don't like"];

const LOWER_BUDGET_PHRASES: &[&str] = &["cheaper", "less expensive", "lower price", "more affordable"];

const RAISE_BUDGET_PHRASES: &[&str] =
    &["more expensive", "better quality", "higher quality", "pricier", "higher end"];

const STYLE_WORDS: &[&str] =
    &["formal", "casual", "sporty", "elegant", "warm", "lightweight", "vintage", "minimalist"];

const GARMENT_WORDS: &[&str] = &[
    "dress", "jacket", "jeans", "pants", "trousers", "skirt", "shirt", "sweater", "coat",
    "shorts", "suit", "sneakers", "heels", "boots", "blouse", "hoodie",
];

const COLOR_WORDS: &[&str] = &[
    "black", "white", "red", "blue", "green", "navy", "beige", "brown", "grey", "gray", "pink",
    "yellow", "purple", "olive", "cream",
];

const LESS_FORMAL_PHRASES: &[&str] = &["too formal", "too fancy", "too dressy"];
const MORE_FORMAL_PHRASES: &[&str] = &["too casual", "more formal", "dressier"];
const COMFORT_PHRASES: &[&str] = &["uncomfortable", "not comfortable", "too tight", "itchy"];

const TOPIC_STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "what", "when", "where", "which", "about", "could",
    "would", "should", "there", "their", "your", "yours", "please", "thanks", "really", "some",
    "something", "anything", "want", "need", "like", "just", "tell", "know", "does", "will",
];

impl ContextExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Derive hints for one routing decision. Never errors; an empty window
    /// or a window with no matches produces an empty hint set.
    pub fn extract(&self, window: &ContextWindow, category: RouteCategory) -> CategoryHints {
        match category {
            RouteCategory::Search => self.extract_search(window),
            RouteCategory::Outfit => self.extract_outfit(window),
            RouteCategory::General => self.extract_general(window),
        }
    }

    fn extract_search(&self, window: &ContextWindow) -> CategoryHints {
        let mut hints = CategoryHints::default();
        let mut seen_brands: Vec<&'static str> = Vec::new();

        for view in user_turns(window) {
            // Explicit prices in the current message are not prior context;
            // the raw message carries them into the prompt itself.
            if !view.is_current {
                if let Some(cents) = extract_budget_cents(&view.tokens) {
                    hints.budget = Some(BudgetHint { ceiling_cents: cents, adjustment: None });
                }
                for word in STYLE_WORDS {
                    if view.tokens.iter().any(|token| token == word)
                        && !hints.style_preferences.iter().any(|existing| existing == word)
                    {
                        hints.style_preferences.push((*word).to_string());
                    }
                }
            }

            if contains_any(&view.normalized, LOWER_BUDGET_PHRASES) {
                self.adjust_budget(&mut hints, BudgetAdjustment::Lowered);
            } else if contains_any(&view.normalized, RAISE_BUDGET_PHRASES) {
                self.adjust_budget(&mut hints, BudgetAdjustment::Raised);
            }

            let turn_brands: Vec<&'static str> = BRANDS
                .iter()
                .filter(|brand| view.normalized.contains(&brand.to_lowercase()))
                .copied()
                .collect();

            let negates = contains_any(&view.normalized, BRAND_NEGATIONS);
            if negates {
                // "different brand" rejects whatever came up before this turn.
                for brand in &seen_brands {
                    push_unique(&mut hints.excluded_brands, brand);
                }
            }
            for brand in &turn_brands {
                let negated_inline = ["not", "no", "without", "except"].iter().any(|negation| {
                    view.normalized.contains(&format!("{negation} {}", brand.to_lowercase()))
                });
                if negated_inline {
                    push_unique(&mut hints.excluded_brands, brand);
                } else if !seen_brands.contains(brand) {
                    seen_brands.push(brand);
                }
            }
        }

        hints
    }

    fn extract_outfit(&self, window: &ContextWindow) -> CategoryHints {
        let mut hints = CategoryHints::default();

        for view in user_turns(window) {
            if !view.is_current {
                for word in GARMENT_WORDS {
                    if view.tokens.iter().any(|token| token == word) {
                        push_unique(&mut hints.garments, word);
                    }
                }
                for word in COLOR_WORDS {
                    if view.tokens.iter().any(|token| token == word) {
                        push_unique(&mut hints.colors, word);
                    }
                }
            }

            if contains_any(&view.normalized, LESS_FORMAL_PHRASES) {
                hints.formality = Some(FormalityBias::LessFormal);
            } else if contains_any(&view.normalized, MORE_FORMAL_PHRASES) {
                hints.formality = Some(FormalityBias::MoreFormal);
            }
            if contains_any(&view.normalized, COMFORT_PHRASES) {
                hints.comfort_issue = true;
            }
        }

        hints
    }

    fn extract_general(&self, window: &ContextWindow) -> CategoryHints {
        let mut hints = CategoryHints::default();

        for view in user_turns(window) {
            if view.is_current {
                continue;
            }
            for token in &view.tokens {
                if token.len() >= 4
                    && token.chars().all(char::is_alphabetic)
                    && !TOPIC_STOPWORDS.contains(&token.as_str())
                {
                    push_unique(&mut hints.topics, token);
                }
            }
        }
        hints.topics.truncate(8);

        hints
    }

    fn adjust_budget(&self, hints: &mut CategoryHints, direction: BudgetAdjustment) {
        let Some(budget) = hints.budget.as_mut() else {
            return;
        };
        let pct = i128::from(self.config.budget_adjust_pct.clamp(1, 90));
        let factor = match direction {
            BudgetAdjustment::Lowered => 100 - pct,
            BudgetAdjustment::Raised => 100 + pct,
        };
        // Widen before multiplying: a near-i64::MAX ceiling from an absurd
        // price mention must not overflow here, extraction never errors.
        let adjusted = i128::from(budget.ceiling_cents) * factor / 100;
        budget.ceiling_cents = adjusted.clamp(0, i128::from(i64::MAX)) as i64;
        budget.adjustment = Some(direction);
    }
}

struct UserTurnView {
    normalized: String,
    tokens: Vec<String>,
    is_current: bool,
}

fn user_turns(window: &ContextWindow) -> Vec<UserTurnView> {
    let turns = window.turns();
    let current_index = turns
        .iter()
        .enumerate()
        .rev()
        .find(|(_, turn)| turn.role == TurnRole::User)
        .map(|(index, _)| index);

    turns
        .iter()
        .enumerate()
        .filter(|(_, turn)| turn.role == TurnRole::User)
        .map(|(index, turn)| {
            let normalized = turn.content.to_lowercase();
            let tokens = tokenize(&normalized);
            UserTurnView { normalized, tokens, is_current: Some(index) == current_index }
        })
        .collect()
}

fn contains_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| normalized.contains(phrase))
}

fn push_unique(values: &mut Vec<String>, candidate: &str) {
    if !values.iter().any(|existing| existing == candidate) {
        values.push(candidate.to_string());
    }
}

fn tokenize(normalized: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(normalized.len());
    for character in normalized.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn extract_budget_cents(tokens: &[String]) -> Option<i64> {
    let budget_context = ["budget", "spend", "cap", "under", "below", "max", "around"];
    let mut ceiling = None;
    for (index, token) in tokens.iter().enumerate() {
        let in_context = index > 0 && budget_context.contains(&tokens[index - 1].as_str());
        if token.starts_with('$') || in_context {
            if let Some(cents) = parse_money_token(token) {
                // Most recent mention wins.
                ceiling = Some(cents);
            }
        }
    }
    ceiling
}

fn parse_money_token(token: &str) -> Option<i64> {
    let trimmed = token.trim_start_matches('$').trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    let (number_part, multiplier) = if let Some(prefix) = trimmed.strip_suffix('k') {
        (prefix, 1_000.0)
    } else {
        (trimmed, 1.0)
    };

    let amount = number_part.parse::<f64>().ok()?;
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    Some((amount * multiplier * 100.0).round() as i64)
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    format!("{sign}${}.{:02}", absolute / 100, absolute % 100)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use crate::domain::chat::{ConversationId, Turn, TurnId, TurnRole};
    use crate::routing::RouteCategory;

    use super::{
        format_cents, BudgetAdjustment, ContextExtractor, ContextWindow, ExtractorConfig,
        FormalityBias,
    };

    fn turn(index: i64, role: TurnRole, content: &str) -> Turn {
        Turn {
            id: TurnId(index),
            conversation_id: ConversationId(1),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn window(specs: &[(TurnRole, &str)]) -> ContextWindow {
        let turns = specs
            .iter()
            .enumerate()
            .map(|(index, (role, content))| turn(index as i64, *role, content))
            .collect();
        ContextWindow::of_last(turns, super::DEFAULT_WINDOW_TURNS)
    }

    #[test]
    fn window_keeps_only_the_most_recent_turns() {
        let turns: Vec<Turn> =
            (0..10).map(|index| turn(index, TurnRole::User, &format!("message {index}"))).collect();

        let bounded = ContextWindow::of_last(turns, 6);
        assert_eq!(bounded.turns().len(), 6);
        assert_eq!(bounded.turns()[0].content, "message 4");
        assert_eq!(bounded.turns()[5].content, "message 9");
    }

    #[test]
    fn fresh_message_with_a_price_yields_no_hints() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[(TurnRole::User, "find a black t-shirt under $30")]),
            RouteCategory::Search,
        );
        assert!(hints.is_empty());
    }

    #[test]
    fn cheaper_feedback_lowers_a_prior_budget_ceiling() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "find a black t-shirt under $30"),
                (TurnRole::Assistant, "{\"result\":{\"category\":\"search\",\"products\":[]}}"),
                (TurnRole::User, "something cheaper"),
            ]),
            RouteCategory::Search,
        );

        let budget = hints.budget.expect("budget hint");
        assert!(budget.ceiling_cents < 3_000);
        assert_eq!(budget.adjustment, Some(BudgetAdjustment::Lowered));
    }

    #[test]
    fn better_quality_feedback_raises_the_ceiling() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "jeans with a budget cap of $80"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "show me better quality options"),
            ]),
            RouteCategory::Search,
        );

        let budget = hints.budget.expect("budget hint");
        assert!(budget.ceiling_cents > 8_000);
        assert_eq!(budget.adjustment, Some(BudgetAdjustment::Raised));
    }

    #[test]
    fn most_recent_price_mention_wins() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "find sneakers under $120"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "actually keep it under $60"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "any other models?"),
            ]),
            RouteCategory::Search,
        );

        assert_eq!(hints.budget.expect("budget hint").ceiling_cents, 6_000);
    }

    #[test]
    fn rejected_brands_accumulate_after_negation_language() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "find Nike running shoes"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "show me a different brand"),
            ]),
            RouteCategory::Search,
        );

        assert_eq!(hints.excluded_brands, vec!["Nike".to_string()]);
    }

    #[test]
    fn inline_brand_negation_excludes_the_named_brand() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "looking for sneakers but not Adidas"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "any price range works"),
            ]),
            RouteCategory::Search,
        );

        assert_eq!(hints.excluded_brands, vec!["Adidas".to_string()]);
    }

    #[test]
    fn too_formal_feedback_flips_the_formality_bias() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "an outfit for date night"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "too formal"),
            ]),
            RouteCategory::Outfit,
        );

        assert_eq!(hints.formality, Some(FormalityBias::LessFormal));
    }

    #[test]
    fn outfit_hints_collect_prior_garments_and_colors() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "I want to wear my black dress and the navy jacket"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "what shoes go with it?"),
            ]),
            RouteCategory::Outfit,
        );

        assert_eq!(hints.garments, vec!["dress".to_string(), "jacket".to_string()]);
        assert_eq!(hints.colors, vec!["black".to_string(), "navy".to_string()]);
    }

    #[test]
    fn uncomfortable_feedback_sets_the_comfort_flag() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "suggest a party look"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "those heels are uncomfortable"),
            ]),
            RouteCategory::Outfit,
        );

        assert!(hints.comfort_issue);
    }

    #[test]
    fn general_hints_keep_topic_keywords_only() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "how does merino wool regulate temperature under $50"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "and in summer?"),
            ]),
            RouteCategory::General,
        );

        assert!(hints.topics.contains(&"merino".to_string()));
        assert!(hints.topics.contains(&"wool".to_string()));
        assert!(hints.budget.is_none());
    }

    #[test]
    fn adjustment_direction_follows_the_configured_factor() {
        let extractor = ContextExtractor::new(ExtractorConfig { budget_adjust_pct: 50 });
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "a coat under $200"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "cheaper please"),
            ]),
            RouteCategory::Search,
        );

        // Direction is contractual, the exact ratio is configuration.
        assert!(hints.budget.expect("budget hint").ceiling_cents < 20_000);
    }

    #[test]
    fn absurd_price_mentions_survive_adjustment_without_overflow() {
        let extractor = ContextExtractor::default();
        let hints = extractor.extract(
            &window(&[
                (TurnRole::User, "a yacht wardrobe under $99999999999999999k"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "show me more expensive options"),
            ]),
            RouteCategory::Search,
        );

        let budget = hints.budget.expect("budget hint");
        assert!(budget.ceiling_cents >= 0);
        assert_eq!(budget.adjustment, Some(BudgetAdjustment::Raised));

        let lowered = extractor.extract(
            &window(&[
                (TurnRole::User, "a yacht wardrobe under $99999999999999999k"),
                (TurnRole::Assistant, "{}"),
                (TurnRole::User, "something cheaper"),
            ]),
            RouteCategory::Search,
        );
        assert!(lowered.budget.expect("budget hint").ceiling_cents >= 0);
    }

    #[test]
    fn cents_render_with_two_decimal_places() {
        assert_eq!(format_cents(3_000), "$30.00");
        assert_eq!(format_cents(2_401), "$24.01");
    }

    fn role_strategy() -> impl Strategy<Value = TurnRole> {
        prop_oneof![Just(TurnRole::User), Just(TurnRole::Assistant)]
    }

    fn category_strategy() -> impl Strategy<Value = RouteCategory> {
        prop_oneof![
            Just(RouteCategory::Search),
            Just(RouteCategory::Outfit),
            Just(RouteCategory::General),
        ]
    }

    proptest! {
        #[test]
        fn extraction_is_idempotent_and_total(
            specs in proptest::collection::vec(
                (role_strategy(), "[ -~]{0,60}"),
                0..8,
            ),
            category in category_strategy(),
        ) {
            let borrowed: Vec<(TurnRole, &str)> =
                specs.iter().map(|(role, content)| (*role, content.as_str())).collect();
            let window = window(&borrowed);

            let extractor = ContextExtractor::default();
            let first = extractor.extract(&window, category);
            let second = extractor.extract(&window, category);
            prop_assert_eq!(first, second);
        }
    }
}
