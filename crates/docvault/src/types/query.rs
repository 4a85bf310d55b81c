//! Search request types

use serde::{Deserialize, Serialize};

/// How a query is matched against the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Case-insensitive substring matching, results in index order
    #[default]
    Lexical,
    /// Cosine similarity over record vectors
    Semantic,
    /// Semantic score plus a boost for lexical matches, one hit per file
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lexical" | "text" | "string" => Ok(Self::Lexical),
            "semantic" | "vector" => Ok(Self::Semantic),
            "hybrid" | "combined" => Ok(Self::Hybrid),
            other => Err(crate::error::Error::InvalidQuery(format!(
                "unknown search mode '{}'",
                other
            ))),
        }
    }
}

/// Search request scoped to one namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query
    #[serde(alias = "q")]
    pub query: String,

    /// Matching mode (defaults to the configured mode)
    #[serde(default)]
    pub mode: Option<SearchMode>,

    /// Maximum number of results; lexical search is unbounded when omitted
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl SearchRequest {
    /// Create a request with the configured default mode
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: None,
            top_k: None,
        }
    }

    /// Set the mode
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the result limit
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Semantic".parse::<SearchMode>().unwrap(), SearchMode::Semantic);
        assert_eq!("combined".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_request_accepts_q_alias() {
        let req: SearchRequest = serde_json::from_str(r#"{"q": "brown", "mode": "hybrid"}"#).unwrap();
        assert_eq!(req.query, "brown");
        assert_eq!(req.mode, Some(SearchMode::Hybrid));
        assert_eq!(req.top_k, None);
    }
}
