// src/config/sources.rs
use serde::{Deserialize, Serialize};

/// One configured research source. Array order in the config file is the
/// adapter priority used to break ranking ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Arxiv {
        #[serde(default)]
        name: Option<String>,
        /// Override for the arXiv query endpoint (mirrors, tests).
        #[serde(default)]
        base_url: Option<String>,
    },
    Feed {
        name: String,
        url: String,
        /// When set, the topic is sent as this query parameter (search feeds).
        #[serde(default)]
        query_param: Option<String>,
    },
    Docs {
        name: String,
        urls: Vec<String>,
        #[serde(default = "default_max_pages")]
        max_pages: usize,
    },
}

fn default_max_pages() -> usize {
    8
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Arxiv { name, .. } => name.as_deref().unwrap_or("arxiv"),
            SourceConfig::Feed { name, .. } | SourceConfig::Docs { name, .. } => name,
        }
    }
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::Arxiv {
            name: None,
            base_url: None,
        },
        SourceConfig::Feed {
            name: "hn".to_string(),
            url: "https://hnrss.org/newest".to_string(),
            query_param: Some("q".to_string()),
        },
    ]
}
