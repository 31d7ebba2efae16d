use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RouteCategory;

/// Hard cap on products carried in a single result, mirroring the catalog
/// search contract.
pub const MAX_PRODUCTS: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Price with currency symbol if present, or "Price not found".
    pub price: String,
    pub description: String,
    pub link: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_city: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductList {
    pub products: Vec<Product>,
    pub search_query: String,
    pub total_found: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutfitPiece {
    pub name: String,
    pub category: String,
    pub image_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outfit {
    pub outfit_description: String,
    #[serde(default)]
    pub items: Vec<OutfitPiece>,
    pub reasoning: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralReply {
    pub response: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("search query must be at least 2 characters")]
    SearchQueryTooShort,
    #[error("outfit description must not be empty")]
    EmptyOutfitDescription,
    #[error("outfit reasoning must not be empty")]
    EmptyOutfitReasoning,
    #[error("general response must not be empty")]
    EmptyResponse,
}

impl ProductList {
    /// Enforce the search output contract: at most [`MAX_PRODUCTS`] entries,
    /// a meaningful search query, and a non-negative total.
    pub fn normalized(mut self) -> Result<Self, ShapeError> {
        if self.search_query.trim().len() < 2 {
            return Err(ShapeError::SearchQueryTooShort);
        }
        if self.products.len() > MAX_PRODUCTS {
            self.products.truncate(MAX_PRODUCTS);
        }
        if self.total_found < 0 {
            self.total_found = self.products.len() as i64;
        }
        Ok(self)
    }

    pub fn fallback(query: &str) -> Self {
        Self { products: Vec::new(), search_query: query.to_string(), total_found: 0 }
    }
}

impl Outfit {
    pub fn normalized(self) -> Result<Self, ShapeError> {
        if self.outfit_description.trim().is_empty() {
            return Err(ShapeError::EmptyOutfitDescription);
        }
        if self.reasoning.trim().is_empty() {
            return Err(ShapeError::EmptyOutfitReasoning);
        }
        Ok(self)
    }

    pub fn fallback() -> Self {
        Self {
            outfit_description: "I'm sorry, I encountered an error while putting an outfit \
                                 together."
                .to_string(),
            items: Vec::new(),
            reasoning: "There was a technical issue. Please try again later or make sure your \
                        wardrobe has some items added."
                .to_string(),
        }
    }
}

impl GeneralReply {
    pub fn normalized(self) -> Result<Self, ShapeError> {
        if self.response.trim().is_empty() {
            return Err(ShapeError::EmptyResponse);
        }
        Ok(self)
    }

    pub fn fallback() -> Self {
        Self {
            response: "I'm sorry, I encountered an issue while processing your request. Please \
                       try again."
                .to_string(),
        }
    }
}

/// Category-tagged result variant. The category is the explicit serialized
/// discriminant so downstream readers never have to infer the shape
/// structurally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum AgentResult {
    Search(ProductList),
    Outfit(Outfit),
    General(GeneralReply),
}

impl AgentResult {
    pub fn category(&self) -> RouteCategory {
        match self {
            Self::Search(_) => RouteCategory::Search,
            Self::Outfit(_) => RouteCategory::Outfit,
            Self::General(_) => RouteCategory::General,
        }
    }

    /// Category-appropriate empty/default result used when generation
    /// attempts are exhausted.
    pub fn fallback_for(category: RouteCategory, raw_message: &str) -> Self {
        match category {
            RouteCategory::Search => Self::Search(ProductList::fallback(raw_message)),
            RouteCategory::Outfit => Self::Outfit(Outfit::fallback()),
            RouteCategory::General => Self::General(GeneralReply::fallback()),
        }
    }
}

/// Wire form of every persisted assistant turn: `{ "result": <variant> }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub result: AgentResult,
}

impl AgentReply {
    pub fn new(result: AgentResult) -> Self {
        Self { result }
    }

    pub fn to_content(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_content(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use crate::routing::RouteCategory;

    use super::{
        AgentReply, AgentResult, GeneralReply, Outfit, Product, ProductList, ShapeError,
        MAX_PRODUCTS,
    };

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            price: "$19.99".to_string(),
            description: "A plain black tee.".to_string(),
            link: "/products/1".to_string(),
            ..Product::default()
        }
    }

    #[test]
    fn persisted_content_is_wrapped_and_category_tagged() {
        let reply = AgentReply::new(AgentResult::General(GeneralReply {
            response: "Hello!".to_string(),
        }));

        let content = reply.to_content().expect("serialize reply");
        assert!(content.starts_with("{\"result\":"));
        assert!(content.contains("\"category\":\"general\""));

        let decoded = AgentReply::from_content(&content).expect("decode reply");
        assert_eq!(decoded, reply);
    }

    #[test]
    fn search_result_round_trips_with_optional_fields_absent() {
        let reply = AgentReply::new(AgentResult::Search(ProductList {
            products: vec![product("Black t-shirt")],
            search_query: "black t-shirt".to_string(),
            total_found: 1,
        }));

        let content = reply.to_content().expect("serialize reply");
        let decoded = AgentReply::from_content(&content).expect("decode reply");
        assert_eq!(decoded.result.category(), RouteCategory::Search);
        assert_eq!(decoded, reply);
    }

    #[test]
    fn normalization_caps_product_count_and_clamps_total() {
        let list = ProductList {
            products: (0..15).map(|i| product(&format!("item-{i}"))).collect(),
            search_query: "shirts".to_string(),
            total_found: -3,
        };

        let normalized = list.normalized().expect("normalize");
        assert_eq!(normalized.products.len(), MAX_PRODUCTS);
        assert_eq!(normalized.total_found, MAX_PRODUCTS as i64);
    }

    #[test]
    fn short_search_query_is_rejected() {
        let list = ProductList { products: Vec::new(), search_query: "x".to_string(), total_found: 0 };
        assert_eq!(list.normalized(), Err(ShapeError::SearchQueryTooShort));
    }

    #[test]
    fn empty_outfit_description_is_rejected() {
        let outfit = Outfit {
            outfit_description: "  ".to_string(),
            items: Vec::new(),
            reasoning: "because".to_string(),
        };
        assert_eq!(outfit.normalized(), Err(ShapeError::EmptyOutfitDescription));
    }

    #[test]
    fn fallbacks_match_their_category() {
        let search = AgentResult::fallback_for(RouteCategory::Search, "warm jacket");
        let outfit = AgentResult::fallback_for(RouteCategory::Outfit, "warm jacket");
        let general = AgentResult::fallback_for(RouteCategory::General, "warm jacket");

        assert_eq!(search.category(), RouteCategory::Search);
        assert_eq!(outfit.category(), RouteCategory::Outfit);
        assert_eq!(general.category(), RouteCategory::General);

        let AgentResult::Search(list) = search else {
            panic!("expected search fallback");
        };
        assert!(list.products.is_empty());
        assert_eq!(list.search_query, "warm jacket");
    }
}
