// src/research/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which kind of provider produced an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Arxiv,
    Rss,
    Docs,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Arxiv => "arxiv",
            SourceType::Rss => "rss",
            SourceType::Docs => "docs",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchItem {
    pub source_type: SourceType,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// 0.0..=1.0, keyword overlap with the query.
    pub relevance_score: f32,
    #[serde(default)]
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub topic: String,
    pub keywords: Vec<String>,
    pub max_results: usize,
}

impl SourceQuery {
    pub fn new(topic: &str, max_results: usize) -> Self {
        Self {
            topic: topic.trim().to_string(),
            keywords: crate::research::extract_keywords(topic),
            max_results,
        }
    }
}

/// One research provider. Zero matches is `Ok(vec![])`; an unreachable upstream
/// or an unparseable response is `PodcastError::SourceUnavailable`. Adapters do
/// not retry.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ResearchItem>>;
    fn name(&self) -> &str;
    fn source_type(&self) -> SourceType;
}
