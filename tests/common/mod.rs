// tests/common/mod.rs
// Shared mocks for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use podcast_generator::audio::{SynthesizedAudio, TtsProvider};
use podcast_generator::error::{PodcastError, Result};
use podcast_generator::script::llm::{CompletionRequest, LanguageModel};
use podcast_generator::{ResearchItem, SourceAdapter, SourceQuery, SourceType};

pub fn item(title: &str, source_type: SourceType, score: f32, day: Option<u32>) -> ResearchItem {
    ResearchItem {
        source_type,
        title: title.to_string(),
        summary: format!("Summary of {title}."),
        url: format!(
            "https://example.test/{}",
            title.to_lowercase().replace(' ', "-")
        ),
        published_at: day.map(|d| Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap()),
        relevance_score: score,
        authors: vec![],
    }
}

/// `n` words in ten-word sentences.
pub fn script_of(n: usize) -> String {
    let mut out = String::new();
    for i in 0..n {
        out.push_str("word");
        if (i + 1) % 10 == 0 || i + 1 == n {
            out.push('.');
        }
        if i + 1 < n {
            out.push(' ');
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

pub enum Behavior {
    Items(Vec<ResearchItem>),
    Fail,
    Sleep(Duration),
}

pub struct MockSource {
    name: String,
    source_type: SourceType,
    behavior: Behavior,
    pub calls: AtomicUsize,
    in_flight: Option<Arc<Gauge>>,
}

/// Tracks concurrent calls and the observed peak.
#[derive(Default)]
pub struct Gauge {
    current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &str, source_type: SourceType, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            source_type,
            behavior,
            calls: AtomicUsize::new(0),
            in_flight: None,
        }
    }

    pub fn items(name: &str, items: Vec<ResearchItem>) -> Arc<dyn SourceAdapter> {
        let st = items.first().map(|i| i.source_type).unwrap_or(SourceType::Rss);
        Arc::new(Self::new(name, st, Behavior::Items(items)))
    }

    pub fn failing(name: &str) -> Arc<dyn SourceAdapter> {
        Arc::new(Self::new(name, SourceType::Rss, Behavior::Fail))
    }

    pub fn sleeping(name: &str, d: Duration) -> Arc<dyn SourceAdapter> {
        Arc::new(Self::new(name, SourceType::Docs, Behavior::Sleep(d)))
    }

    pub fn gauged(mut self, gauge: Arc<Gauge>) -> Self {
        self.in_flight = Some(gauge);
        self
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<ResearchItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(g) = &self.in_flight {
            let now = g.current.fetch_add(1, Ordering::SeqCst) + 1;
            g.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            g.current.fetch_sub(1, Ordering::SeqCst);
        }
        match &self.behavior {
            Behavior::Items(items) => Ok(items.clone()),
            Behavior::Fail => Err(PodcastError::source_unavailable(
                self.name.clone(),
                "HTTP 503 Service Unavailable",
            )),
            Behavior::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(vec![])
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }
}

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

/// Replies from a queue and records every request.
pub struct ScriptedLlm {
    replies: Mutex<Vec<Result<String>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String>>) -> Arc<Self> {
        let mut replies = replies;
        replies.reverse();
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop()
            .unwrap_or_else(|| Err(PodcastError::llm("no scripted reply left")))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// TTS
// ---------------------------------------------------------------------------

/// Echoes the input text as "audio". Inputs containing a key of `failures`
/// fail that many times before succeeding; later segments finish first.
pub struct FlakyTts {
    max_chars: usize,
    failures: Mutex<HashMap<String, u32>>,
    pub calls: Mutex<Vec<String>>,
    pub in_flight: Gauge,
}

impl FlakyTts {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: Gauge::default(),
        }
    }

    pub fn fail_times(self, marker: &str, times: u32) -> Self {
        self.failures.lock().insert(marker.to_string(), times);
        self
    }

    pub fn calls_containing(&self, marker: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(marker)).count()
    }
}

#[async_trait]
impl TtsProvider for FlakyTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        self.calls.lock().push(text.to_string());
        let now = self.in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight.peak.fetch_max(now, Ordering::SeqCst);

        // Shorter inputs return sooner, so completion order differs from index order.
        let delay = 5 + (text.len() as u64 % 7) * 3;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.current.fetch_sub(1, Ordering::SeqCst);

        let should_fail = {
            let mut failures = self.failures.lock();
            match failures.iter_mut().find(|(k, _)| text.contains(k.as_str())) {
                Some((_, left)) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(PodcastError::tts("HTTP 429 Too Many Requests"));
        }
        Ok(SynthesizedAudio {
            bytes: text.as_bytes().to_vec(),
            duration_seconds: 1.0,
        })
    }

    fn max_input_chars(&self) -> usize {
        self.max_chars
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}
