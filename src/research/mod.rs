// src/research/mod.rs
//! Research stage: fan a topic out to every configured source adapter, isolate
//! per-source failures, then deduplicate and rank the merged items.

pub mod providers;
pub mod types;

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{PodcastError, Result};
use crate::research::types::{ResearchItem, SourceAdapter, SourceQuery, SourceType};

/// Configured adapters in priority order (index 0 wins ties).
pub type SourceSet = Vec<Arc<dyn SourceAdapter>>;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("research_runs_total", "Research fan-outs started.");
        describe_counter!(
            "research_source_errors_total",
            "Source adapter failures and timeouts."
        );
        describe_counter!(
            "research_items_total",
            "Items kept after dedup + truncation."
        );
        describe_counter!(
            "research_dedup_total",
            "Items dropped as duplicates of another item."
        );
        describe_histogram!("research_fetch_ms", "Per-source fetch time in milliseconds.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    // 5) Length cap, cut back to the last full word
    if out.chars().count() > max_chars {
        let capped: String = out.chars().take(max_chars).collect();
        out = match capped.rfind(' ') {
            Some(pos) if pos > 0 => format!("{}...", &capped[..pos]),
            _ => capped,
        };
    }

    out
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "about", "what", "how", "why", "are", "new",
    "its", "that", "this", "using", "use", "via", "over", "under", "between", "recent", "latest",
];

/// Lowercase topic words (>= 3 chars) minus stop words, first occurrence order.
/// Falls back to every word when the filter would leave nothing.
pub fn extract_keywords(topic: &str) -> Vec<String> {
    let words: Vec<String> = topic
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    let mut out: Vec<String> = Vec::new();
    for w in &words {
        if w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()) && !out.contains(w) {
            out.push(w.clone());
        }
    }
    if out.is_empty() {
        for w in words {
            if !out.contains(&w) {
                out.push(w);
            }
        }
    }
    out
}

/// Keyword overlap in 0.0..=1.0: title hits weigh 0.6, summary hits 0.4.
pub fn keyword_relevance(keywords: &[String], title: &str, summary: &str) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let title = title.to_lowercase();
    let summary = summary.to_lowercase();
    let k = keywords.len() as f32;
    let in_title = keywords.iter().filter(|w| title.contains(w.as_str())).count() as f32;
    let in_summary = keywords.iter().filter(|w| summary.contains(w.as_str())).count() as f32;
    (0.6 * in_title / k + 0.4 * in_summary / k).clamp(0.0, 1.0)
}

/// Normalized title used for cross-source duplicate detection.
pub fn dedup_key(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cmp_published_desc(a: &ResearchItem, b: &ResearchItem) -> Ordering {
    match (a.published_at, b.published_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Merge per-source batches `(priority, items)`: drop duplicate
/// `(title, source_type)` pairs keeping the highest score (first seen on ties),
/// order by score desc, then recency, then adapter priority, and truncate.
/// Returns `(ranked, duplicates_dropped)`.
pub fn merge_and_rank(
    mut batches: Vec<(usize, Vec<ResearchItem>)>,
    max_items: usize,
) -> (Vec<ResearchItem>, usize) {
    batches.sort_by_key(|(priority, _)| *priority);

    let mut best: HashMap<(String, SourceType), (usize, ResearchItem)> = HashMap::new();
    let mut duplicates = 0usize;
    for (priority, items) in batches {
        for item in items {
            let mut title_key = dedup_key(&item.title);
            if title_key.is_empty() {
                title_key = item.url.clone();
            }
            match best.entry((title_key, item.source_type)) {
                Entry::Vacant(e) => {
                    e.insert((priority, item));
                }
                Entry::Occupied(mut e) => {
                    duplicates += 1;
                    if item.relevance_score > e.get().1.relevance_score {
                        e.insert((priority, item));
                    }
                }
            }
        }
    }

    let mut ranked: Vec<(usize, ResearchItem)> = best.into_values().collect();
    ranked.sort_by(|(pa, a), (pb, b)| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| cmp_published_desc(a, b))
            .then_with(|| pa.cmp(pb))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.url.cmp(&b.url))
    });
    ranked.truncate(max_items);

    (ranked.into_iter().map(|(_, item)| item).collect(), duplicates)
}

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Upper bound on simultaneous adapter calls.
    pub max_concurrent: usize,
    pub source_timeout: Duration,
    pub max_results_per_source: usize,
    /// Cap on items handed to the script stage.
    pub max_items: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            source_timeout: Duration::from_secs(20),
            max_results_per_source: 5,
            max_items: 12,
        }
    }
}

pub struct ResearchOrchestrator {
    settings: ResearchSettings,
}

impl ResearchOrchestrator {
    pub fn new(settings: ResearchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Query every source concurrently. Failed or timed-out sources are logged
    /// and skipped; fails with `NoResearchAvailable` only when no source yields
    /// a single item.
    pub async fn research(
        &self,
        topic: &str,
        sources: &[Arc<dyn SourceAdapter>],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResearchItem>> {
        ensure_metrics_described();
        counter!("research_runs_total").increment(1);

        let query = Arc::new(SourceQuery::new(topic, self.settings.max_results_per_source));
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let timeout = self.settings.source_timeout;

        let mut tasks = JoinSet::new();
        for (priority, adapter) in sources.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let query = Arc::clone(&query);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let name = adapter.name().to_string();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (priority, name, Err(PodcastError::Cancelled)),
                };
                let t0 = Instant::now();
                let outcome = match tokio::time::timeout(timeout, adapter.fetch(&query)).await {
                    Ok(res) => res,
                    Err(_) => Err(PodcastError::source_unavailable(
                        name.clone(),
                        format!("timed out after {} ms", timeout.as_millis()),
                    )),
                };
                histogram!("research_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                (priority, name, outcome)
            });
        }

        let mut batches = Vec::with_capacity(sources.len());
        loop {
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(PodcastError::Cancelled);
                }
                next = tasks.join_next() => next,
            };
            let Some(joined) = joined else { break };
            match joined {
                Ok((priority, name, Ok(items))) => {
                    info!(target: "research", source = %name, items = items.len(), "source fetched");
                    batches.push((priority, items));
                }
                Ok((_, name, Err(e))) => {
                    warn!(target: "research", source = %name, error = %e, "source skipped");
                    counter!("research_source_errors_total", "source" => name).increment(1);
                }
                Err(e) => {
                    warn!(target: "research", error = %e, "source task aborted");
                    counter!("research_source_errors_total", "source" => "unknown").increment(1);
                }
            }
        }

        let total: usize = batches.iter().map(|(_, items)| items.len()).sum();
        if total == 0 {
            return Err(PodcastError::NoResearchAvailable {
                topic: query.topic.clone(),
            });
        }

        let (ranked, duplicates) = merge_and_rank(batches, self.settings.max_items);
        counter!("research_items_total").increment(ranked.len() as u64);
        counter!("research_dedup_total").increment(duplicates as u64);
        info!(
            target: "research",
            fetched = total,
            duplicates,
            kept = ranked.len(),
            "research merged"
        );

        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(title: &str, source_type: SourceType, score: f32, day: Option<u32>) -> ResearchItem {
        ResearchItem {
            source_type,
            title: title.to_string(),
            summary: String::new(),
            url: format!("https://example.test/{}", dedup_key(title).replace(' ', "-")),
            published_at: day.map(|d| chrono::Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()),
            relevance_score: score,
            authors: vec![],
        }
    }

    #[test]
    fn normalize_text_strips_tags_and_collapses_ws() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p> &ldquo;ok&rdquo;  ";
        assert_eq!(normalize_text(s, 500), r#"Hello, world "ok""#);
    }

    #[test]
    fn normalize_text_caps_at_word_boundary() {
        let out = normalize_text("alpha beta gamma delta", 13);
        assert_eq!(out, "alpha beta...");
    }

    #[test]
    fn keywords_drop_stop_words_and_short_words() {
        assert_eq!(
            extract_keywords("The latest in Rust async runtimes"),
            vec!["rust".to_string(), "async".into(), "runtimes".into()]
        );
        // Nothing survives the filter: fall back to raw words.
        assert_eq!(extract_keywords("AI"), vec!["ai".to_string()]);
    }

    #[test]
    fn relevance_weights_title_over_summary() {
        let kw = vec!["quantum".to_string(), "computing".to_string()];
        let title_only = keyword_relevance(&kw, "Quantum Computing today", "");
        let summary_only = keyword_relevance(&kw, "", "about quantum computing");
        assert!((title_only - 0.6).abs() < 1e-6);
        assert!((summary_only - 0.4).abs() < 1e-6);
        assert_eq!(keyword_relevance(&kw, "gardening", "tomatoes"), 0.0);
    }

    #[test]
    fn dedup_keeps_highest_score_per_title_and_source_type() {
        let batches = vec![
            (0, vec![item("Attention Is All You Need", SourceType::Arxiv, 0.4, Some(1))]),
            (
                1,
                vec![
                    item("attention is all you need!", SourceType::Arxiv, 0.9, Some(1)),
                    // Same title, different source type: kept separately.
                    item("Attention is all you need", SourceType::Rss, 0.5, Some(2)),
                ],
            ),
        ];
        let (ranked, dups) = merge_and_rank(batches, 10);
        assert_eq!(dups, 1);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].relevance_score, 0.9);
        assert_eq!(ranked[1].source_type, SourceType::Rss);
    }

    #[test]
    fn ranking_breaks_ties_by_recency_then_priority() {
        let batches = vec![
            (1, vec![item("B older", SourceType::Rss, 0.5, Some(1))]),
            (0, vec![item("A undated", SourceType::Arxiv, 0.5, None)]),
            (2, vec![item("C newer", SourceType::Docs, 0.5, Some(9))]),
            (1, vec![item("D same day low prio", SourceType::Rss, 0.5, Some(9))]),
            (0, vec![item("E top", SourceType::Arxiv, 0.8, None)]),
        ];
        let (ranked, _) = merge_and_rank(batches, 10);
        let titles: Vec<&str> = ranked.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["E top", "D same day low prio", "C newer", "B older", "A undated"]
        );
    }

    #[test]
    fn merge_truncates_to_max_items() {
        let batches = vec![(
            0,
            (1..=5)
                .map(|i| item(&format!("paper {i}"), SourceType::Arxiv, i as f32 / 10.0, None))
                .collect(),
        )];
        let (ranked, _) = merge_and_rank(batches, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].title, "paper 5");
    }
}
