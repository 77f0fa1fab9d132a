// src/research/providers/docs.rs
//! Documentation crawler: breadth-first over same-site pages below each root,
//! one research item per page that mentions the query keywords.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Url;

use crate::error::{PodcastError, Result};
use crate::research::types::{ResearchItem, SourceAdapter, SourceQuery, SourceType};
use crate::research::{keyword_relevance, normalize_text};

const SUMMARY_PARAGRAPHS: usize = 2;
pub const DEFAULT_CRAWL_BUDGET: Duration = Duration::from_secs(15);

pub struct DocsAdapter {
    name: String,
    roots: Vec<String>,
    max_pages: usize,
    crawl_budget: Duration,
    pages: PageSource,
}

enum PageSource {
    /// url -> html
    Fixture(HashMap<String, String>),
    Http(reqwest::Client),
}

struct Page {
    url: Url,
    title: String,
    paragraphs: Vec<String>,
    links: Vec<Url>,
}

impl DocsAdapter {
    pub fn from_urls(name: &str, roots: Vec<String>, max_pages: usize, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            roots,
            max_pages: max_pages.max(1),
            crawl_budget: DEFAULT_CRAWL_BUDGET,
            pages: PageSource::Http(client),
        }
    }

    pub fn from_fixture(
        name: &str,
        roots: Vec<String>,
        max_pages: usize,
        pages: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            roots,
            max_pages: max_pages.max(1),
            crawl_budget: DEFAULT_CRAWL_BUDGET,
            pages: PageSource::Fixture(pages),
        }
    }

    /// Wall-clock limit for one crawl. Keep it under the orchestrator's
    /// per-source timeout so pages already fetched are returned rather than
    /// lost with the whole adapter.
    pub fn with_crawl_budget(mut self, budget: Duration) -> Self {
        self.crawl_budget = budget.max(Duration::from_millis(1));
        self
    }

    async fn get(&self, url: &Url) -> Result<String> {
        match &self.pages {
            PageSource::Fixture(map) => map.get(url.as_str()).cloned().ok_or_else(|| {
                PodcastError::source_unavailable(&self.name, format!("404 for {url}"))
            }),
            PageSource::Http(client) => {
                let resp = client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| PodcastError::source_unavailable(&self.name, e))?;
                resp.text()
                    .await
                    .map_err(|e| PodcastError::source_unavailable(&self.name, e))
            }
        }
    }

    /// Breadth-first crawl bounded by `max_pages` and the crawl budget. A
    /// single page gets at most half the budget. Fails only when no page at
    /// all could be fetched.
    async fn crawl(&self) -> Result<Vec<Page>> {
        let deadline = tokio::time::Instant::now() + self.crawl_budget;
        let page_cap = self.crawl_budget / 2;
        let mut queue: VecDeque<(Url, String)> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        for root in &self.roots {
            let url = Url::parse(root).map_err(|e| {
                PodcastError::source_unavailable(&self.name, format!("bad root url {root}: {e}"))
            })?;
            let scope = scope_prefix(&url);
            if seen.insert(url.as_str().to_string()) {
                queue.push_back((url, scope));
            }
        }

        let mut pages = Vec::new();
        let mut last_error = None;
        while let Some((url, scope)) = queue.pop_front() {
            if pages.len() >= self.max_pages {
                break;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                tracing::debug!(provider = %self.name, pages = pages.len(), "docs crawl budget spent");
                break;
            }
            let fetched = tokio::time::timeout(remaining.min(page_cap), self.get(&url))
                .await
                .unwrap_or_else(|_| {
                    Err(PodcastError::source_unavailable(
                        &self.name,
                        format!("timed out fetching {url}"),
                    ))
                });
            let html = match fetched {
                Ok(h) => h,
                Err(e) => {
                    tracing::debug!(provider = %self.name, %url, error = %e, "docs page skipped");
                    last_error = Some(e);
                    continue;
                }
            };
            let page = parse_page(url, &html);
            for link in &page.links {
                if link.as_str().starts_with(&scope) && seen.insert(link.as_str().to_string()) {
                    queue.push_back((link.clone(), scope.clone()));
                }
            }
            pages.push(page);
        }

        if pages.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                PodcastError::source_unavailable(&self.name, "no pages fetched")
            }));
        }
        Ok(pages)
    }
}

/// Everything up to and including the last '/' of the root path.
fn scope_prefix(root: &Url) -> String {
    let s = root.as_str();
    match s.rfind('/') {
        Some(pos) if pos + 1 > root.origin().ascii_serialization().len() => s[..=pos].to_string(),
        _ => format!("{}/", root.origin().ascii_serialization()),
    }
}

fn parse_page(url: Url, html: &str) -> Page {
    static RE_TITLE: OnceCell<Regex> = OnceCell::new();
    static RE_H1: OnceCell<Regex> = OnceCell::new();
    static RE_PARA: OnceCell<Regex> = OnceCell::new();
    static RE_HREF: OnceCell<Regex> = OnceCell::new();
    let re_title = RE_TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
    let re_h1 = RE_H1.get_or_init(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());
    let re_para = RE_PARA.get_or_init(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").unwrap());
    let re_href =
        RE_HREF.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+)[^"']*["']"#).unwrap());

    let title = re_title
        .captures(html)
        .or_else(|| re_h1.captures(html))
        .map(|c| normalize_text(&c[1], 300))
        .unwrap_or_default();

    let paragraphs = re_para
        .captures_iter(html)
        .map(|c| normalize_text(&c[1], 800))
        .filter(|p| !p.is_empty())
        .collect();

    let links = re_href
        .captures_iter(html)
        .filter_map(|c| url.join(c[1].trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|mut u| {
            u.set_fragment(None);
            u
        })
        .collect();

    Page {
        url,
        title,
        paragraphs,
        links,
    }
}

/// The best-matching paragraphs, kept in document order.
fn summarize(paragraphs: &[String], keywords: &[String]) -> String {
    let mut scored: Vec<(usize, usize)> = paragraphs
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let lower = p.to_lowercase();
            (i, keywords.iter().filter(|k| lower.contains(k.as_str())).count())
        })
        .filter(|(_, hits)| *hits > 0)
        .collect();
    if scored.is_empty() {
        return paragraphs.first().cloned().unwrap_or_default();
    }
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(SUMMARY_PARAGRAPHS);
    scored.sort_by_key(|(i, _)| *i);
    let joined = scored
        .iter()
        .map(|(i, _)| paragraphs[*i].as_str())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined, 1_200)
}

#[async_trait]
impl SourceAdapter for DocsAdapter {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<ResearchItem>> {
        let pages = self.crawl().await?;
        let mut out = Vec::new();
        for page in pages {
            let body = page.paragraphs.join(" ");
            let relevance_score = keyword_relevance(&query.keywords, &page.title, &body);
            if relevance_score <= 0.0 {
                continue;
            }
            let title = if page.title.is_empty() {
                page.url.path().to_string()
            } else {
                page.title
            };
            out.push(ResearchItem {
                source_type: SourceType::Docs,
                title,
                summary: summarize(&page.paragraphs, &query.keywords),
                url: page.url.to_string(),
                published_at: None,
                relevance_score,
                authors: Vec::new(),
            });
        }
        out.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        out.truncate(query.max_results);
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        SourceType::Docs
    }
}
