// src/research/providers/feed.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::{PodcastError, Result};
use crate::research::providers::scrub_html_entities_for_xml;
use crate::research::types::{ResearchItem, SourceAdapter, SourceQuery, SourceType};
use crate::research::{keyword_relevance, normalize_text};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RSS 2.0 news/blog feed. Items without any keyword overlap are dropped.
pub struct FeedAdapter {
    name: String,
    mode: Mode,
}

enum Mode {
    // Own copy, so tests can pass any &str.
    Fixture(String),
    Http {
        url: String,
        query_param: Option<String>,
        client: reqwest::Client,
    },
}

impl FeedAdapter {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(
        name: &str,
        url: &str,
        query_param: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                query_param,
                client,
            },
        }
    }

    fn parse_items_from_str(&self, s: &str, query: &SourceQuery) -> Result<Vec<ResearchItem>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| PodcastError::source_unavailable(&self.name, format!("parsing rss: {e}")))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default(), 300);
            let summary = normalize_text(it.description.as_deref().unwrap_or_default(), 1_200);
            if title.is_empty() && summary.is_empty() {
                continue;
            }
            let relevance_score = keyword_relevance(&query.keywords, &title, &summary);
            if relevance_score <= 0.0 {
                continue;
            }
            out.push(ResearchItem {
                source_type: SourceType::Rss,
                title,
                summary,
                url: it.link.unwrap_or_default().trim().to_string(),
                published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
                relevance_score,
                authors: it
                    .author
                    .map(|a| normalize_text(&a, 100))
                    .filter(|a| !a.is_empty())
                    .into_iter()
                    .collect(),
            });
        }

        out.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        out.truncate(query.max_results);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ResearchItem>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s, query),
            Mode::Http {
                url,
                query_param,
                client,
            } => {
                let mut req = client.get(url.as_str());
                if let Some(param) = query_param {
                    req = req.query(&[(param.as_str(), query.topic.as_str())]);
                }
                let body = match req.send().await.and_then(|r| r.error_for_status()) {
                    Ok(resp) => resp
                        .text()
                        .await
                        .map_err(|e| PodcastError::source_unavailable(&self.name, e))?,
                    Err(e) => {
                        tracing::warn!(error = %e, provider = %self.name, "feed http error");
                        return Err(PodcastError::source_unavailable(&self.name, e));
                    }
                };
                self.parse_items_from_str(&body, query)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example</title>
  <item>
    <title>Rust 1.80 ships &ldquo;LazyLock&rdquo;</title>
    <link>https://blog.example/rust-180</link>
    <pubDate>Thu, 25 Jul 2024 10:00:00 GMT</pubDate>
    <description><![CDATA[<p>The Rust team announces <b>LazyLock</b>&nbsp;stabilization.</p>]]></description>
  </item>
  <item>
    <title>Gardening tips</title>
    <link>https://blog.example/garden</link>
    <description>Tomatoes love sun.</description>
  </item>
</channel></rss>"#;

    #[tokio::test]
    async fn irrelevant_items_are_dropped_and_html_is_cleaned() {
        let a = FeedAdapter::from_fixture("blog", FEED);
        let items = a.fetch(&SourceQuery::new("rust", 5)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, r#"Rust 1.80 ships "LazyLock""#);
        assert_eq!(
            items[0].summary,
            "The Rust team announces LazyLock stabilization."
        );
        assert!(items[0].published_at.is_some());
        assert_eq!(items[0].source_type, SourceType::Rss);
    }

    #[tokio::test]
    async fn no_matches_is_empty_success() {
        let a = FeedAdapter::from_fixture("blog", FEED);
        let items = a.fetch(&SourceQuery::new("kubernetes", 5)).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn channel_without_items_parses() {
        let a = FeedAdapter::from_fixture("blog", "<rss><channel><title>x</title></channel></rss>");
        assert!(a.fetch(&SourceQuery::new("rust", 5)).await.unwrap().is_empty());
    }
}
