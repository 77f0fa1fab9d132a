// src/research/providers/arxiv.rs
//! arXiv adapter: queries the public export API and parses its Atom feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::{PodcastError, Result};
use crate::research::types::{ResearchItem, SourceAdapter, SourceQuery, SourceType};
use crate::research::{keyword_relevance, normalize_text};

pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}

pub struct ArxivAdapter {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl ArxivAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, ARXIV_API_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            name: "arxiv".to_string(),
            mode: Mode::Http {
                base_url: base_url.to_string(),
                client,
            },
        }
    }

    /// Serve a canned Atom document instead of calling the API.
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            name: "arxiv".to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// `all:kw1 AND all:kw2`, or the raw topic when it has no keywords.
    pub fn search_expression(query: &SourceQuery) -> String {
        if query.keywords.is_empty() {
            return format!("all:{}", query.topic);
        }
        query
            .keywords
            .iter()
            .map(|k| format!("all:{k}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn parse_items_from_str(&self, xml: &str, query: &SourceQuery) -> Result<Vec<ResearchItem>> {
        let feed: Feed = from_str(xml)
            .map_err(|e| PodcastError::source_unavailable(&self.name, format!("parsing atom: {e}")))?;

        let mut out = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            let url = entry.id.unwrap_or_default().trim().to_string();
            if url.contains("/api/errors") {
                let reason = entry.summary.as_deref().unwrap_or("unknown error");
                return Err(PodcastError::source_unavailable(
                    &self.name,
                    format!("arxiv api error: {}", normalize_text(reason, 200)),
                ));
            }

            let title = normalize_text(entry.title.as_deref().unwrap_or_default(), 300);
            if title.is_empty() {
                continue;
            }
            let summary = normalize_text(entry.summary.as_deref().unwrap_or_default(), 1_500);
            let published_at = entry
                .published
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc));
            let authors = entry
                .authors
                .into_iter()
                .filter_map(|a| a.name)
                .map(|n| normalize_text(&n, 100))
                .filter(|n| !n.is_empty())
                .collect();

            out.push(ResearchItem {
                source_type: SourceType::Arxiv,
                relevance_score: keyword_relevance(&query.keywords, &title, &summary),
                title,
                summary,
                url,
                published_at,
                authors,
            });
        }

        out.truncate(query.max_results);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ResearchItem>> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_items_from_str(xml, query),
            Mode::Http { base_url, client } => {
                let params = [
                    ("search_query", Self::search_expression(query)),
                    ("start", "0".to_string()),
                    ("max_results", query.max_results.to_string()),
                    ("sortBy", "submittedDate".to_string()),
                    ("sortOrder", "descending".to_string()),
                ];
                let resp = client
                    .get(base_url.as_str())
                    .query(&params)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| PodcastError::source_unavailable(&self.name, e))?;
                let body = resp
                    .text()
                    .await
                    .map_err(|e| PodcastError::source_unavailable(&self.name, e))?;
                self.parse_items_from_str(&body, query)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Arxiv
    }
}
