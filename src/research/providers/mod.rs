// src/research/providers/mod.rs
pub mod arxiv;
pub mod docs;
pub mod feed;

use std::sync::Arc;
use std::time::Duration;

use crate::config::SourceConfig;
use crate::error::{PodcastError, Result};
use crate::research::providers::{arxiv::ArxivAdapter, docs::DocsAdapter, feed::FeedAdapter};
use crate::research::SourceSet;

const USER_AGENT: &str = concat!("podcast-generator/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client for research providers. The orchestrator enforces the
/// overall per-source timeout; this one only bounds a single request.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(request_timeout)
        .build()
        .map_err(|e| PodcastError::Config(format!("building research http client: {e}")))
}

/// Build adapters in configuration order (= priority order). Crawling
/// adapters get three quarters of `source_timeout` as their own budget.
pub fn build_sources(
    configs: &[SourceConfig],
    client: &reqwest::Client,
    source_timeout: Duration,
) -> Result<SourceSet> {
    let mut out: SourceSet = Vec::with_capacity(configs.len());
    for cfg in configs {
        match cfg {
            SourceConfig::Arxiv { base_url, .. } => {
                let adapter = match base_url {
                    Some(url) => ArxivAdapter::with_base_url(client.clone(), url),
                    None => ArxivAdapter::new(client.clone()),
                };
                out.push(Arc::new(adapter.named(cfg.name())));
            }
            SourceConfig::Feed {
                name,
                url,
                query_param,
            } => {
                out.push(Arc::new(FeedAdapter::from_url(
                    name,
                    url,
                    query_param.clone(),
                    client.clone(),
                )));
            }
            SourceConfig::Docs {
                name,
                urls,
                max_pages,
            } => {
                if urls.is_empty() {
                    return Err(PodcastError::Config(format!(
                        "docs source '{name}' has no urls"
                    )));
                }
                out.push(Arc::new(
                    DocsAdapter::from_urls(name, urls.clone(), *max_pages, client.clone())
                        .with_crawl_budget(source_timeout * 3 / 4),
                ));
            }
        }
    }
    Ok(out)
}

/// Replace HTML-only entities that XML parsers reject.
pub(crate) fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
