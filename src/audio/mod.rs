// src/audio/mod.rs
//! Audio stage: split the script under the provider limit, synthesize segments
//! concurrently with bounded retries, then splice them in script order.

pub mod mp3;
pub mod segment;
pub mod tts;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PodcastError, Result};
use crate::text_digest;

pub use segment::{split_script, AudioSegment};
pub use tts::{SynthesizedAudio, TtsProvider};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("tts_segments_total", "Segments synthesized successfully.");
        describe_counter!(
            "tts_segment_retries_total",
            "Segment synthesis attempts that failed and were retried."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per segment, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): base * 2^(attempt-1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// The spliced episode audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioTrack {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub duration_seconds: f64,
    pub segment_count: usize,
}

/// Synthesize one segment, retrying transient failures with exponential
/// backoff. Exhaustion yields `AudioSynthesisFailed` naming the segment.
pub async fn synthesize_with_retry(
    tts: &dyn TtsProvider,
    segment: &AudioSegment,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<SynthesizedAudio> {
    let text = segment.text_chunk.trim();
    if text.is_empty() {
        return Ok(SynthesizedAudio {
            bytes: Vec::new(),
            duration_seconds: 0.0,
        });
    }

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match tts.synthesize(text).await {
            Ok(audio) => {
                counter!("tts_segments_total").increment(1);
                debug!(
                    target: "audio",
                    segment = segment.index,
                    attempt,
                    bytes = audio.bytes.len(),
                    "segment synthesized"
                );
                return Ok(audio);
            }
            Err(PodcastError::Cancelled) => return Err(PodcastError::Cancelled),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            warn!(
                target: "audio",
                segment = segment.index,
                attempts = attempt,
                digest = %text_digest(text),
                error = %err,
                "segment failed, giving up"
            );
            return Err(PodcastError::AudioSynthesisFailed {
                segment_index: segment.index,
                attempts: attempt,
                message: err.to_string(),
            });
        }

        counter!("tts_segment_retries_total").increment(1);
        let delay = policy.delay_after(attempt);
        warn!(
            target: "audio",
            segment = segment.index,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "segment failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(PodcastError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Splice segment audio in index order. Each MP3 part contributes only its
/// audio frames; the first part's ID3v2 tag is kept at the front. Parts that
/// do not demux are appended minus any ID3v2 tag.
pub fn concat_segments(parts: Vec<SynthesizedAudio>) -> AudioTrack {
    let segment_count = parts.len();
    let mut bytes = Vec::with_capacity(parts.iter().map(|p| p.bytes.len()).sum());
    let mut duration_seconds = 0.0;
    if let Some(first) = parts.first() {
        bytes.extend_from_slice(&first.bytes[..mp3::id3v2_len(&first.bytes)]);
    }
    for part in &parts {
        match mp3::demux(&part.bytes) {
            Some(stream) => bytes.extend_from_slice(&stream.frames),
            None => bytes.extend_from_slice(mp3::strip_id3v2(&part.bytes)),
        }
        duration_seconds += part.duration_seconds;
    }
    AudioTrack {
        bytes,
        duration_seconds,
        segment_count,
    }
}

pub struct AudioSynthesizer {
    tts: Arc<dyn TtsProvider>,
    settings: AudioSettings,
}

impl AudioSynthesizer {
    pub fn new(tts: Arc<dyn TtsProvider>, settings: AudioSettings) -> Self {
        Self { tts, settings }
    }

    pub fn segments(&self, script_text: &str) -> Vec<AudioSegment> {
        split_script(script_text, self.tts.max_input_chars())
    }

    /// Any segment that exhausts its retries fails the whole track; no
    /// partial audio is returned.
    pub async fn synthesize(
        &self,
        script_text: &str,
        cancel: &CancellationToken,
    ) -> Result<AudioTrack> {
        ensure_metrics_described();
        let segments = self.segments(script_text);
        if segments.is_empty() {
            return Err(PodcastError::EmptyScript);
        }
        let total = segments.len();
        info!(
            target: "audio",
            provider = self.tts.provider_name(),
            segments = total,
            max_chars = self.tts.max_input_chars(),
            "synthesizing script"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();
        for segment in segments {
            let tts = Arc::clone(&self.tts);
            let semaphore = Arc::clone(&semaphore);
            let policy = self.settings.retry;
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let index = segment.index;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (index, Err(PodcastError::Cancelled)),
                };
                let out = synthesize_with_retry(tts.as_ref(), &segment, &policy, &cancel).await;
                (index, out)
            });
        }

        let mut parts: Vec<Option<SynthesizedAudio>> = (0..total).map(|_| None).collect();
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
                Ok((index, Ok(audio))) => parts[index] = Some(audio),
                Ok((_, Err(e))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(PodcastError::tts(format!("segment task failed: {e}")));
                }
            }
        }

        let parts: Vec<SynthesizedAudio> = parts.into_iter().flatten().collect();
        if parts.len() != total {
            return Err(PodcastError::tts("segment results incomplete"));
        }
        let track = concat_segments(parts);
        info!(
            target: "audio",
            segments = track.segment_count,
            bytes = track.bytes.len(),
            duration_seconds = track.duration_seconds,
            "audio assembled"
        );
        Ok(track)
    }
}
