// src/pipeline.rs
//! Episode coordinator: research -> script -> audio, failing fast and tagging
//! every error with the stage it came from.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::tts::{ElevenLabsTts, OpenAiTts};
use crate::audio::{AudioSynthesizer, TtsProvider};
use crate::config::{AppConfig, LlmProvider, TtsProviderKind};
use crate::error::{GenerateError, PodcastError, Result, Stage};
use crate::research::types::{ResearchItem, SourceAdapter};
use crate::research::ResearchOrchestrator;
use crate::script::llm::{AnthropicModel, LanguageModel, OpenAiModel};
use crate::script::{DurationOutOfTolerance, ScriptSynthesizer};
use crate::text_digest;

pub const MAX_DURATION_MINUTES: f64 = 60.0;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Episode generations started.");
        describe_counter!(
            "pipeline_failures_total",
            "Episode generations that failed, labeled by stage."
        );
    });
}

/// One generated episode. Serializes as metadata; audio bytes are skipped.
#[derive(Debug, Clone, Serialize)]
pub struct Episode {
    pub id: String,
    pub topic: String,
    pub script_text: String,
    #[serde(skip)]
    pub audio_bytes: Vec<u8>,
    pub duration_seconds: f64,
    pub word_count: u32,
    pub sources_used: Vec<ResearchItem>,
    pub target_duration_minutes: f64,
    pub deviation: Option<DurationOutOfTolerance>,
    pub generated_at: DateTime<Utc>,
}

/// Trimmed topic, or `InvalidRequest`.
pub fn validate_request(topic: &str, target_duration_minutes: f64) -> Result<String> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(PodcastError::InvalidRequest("topic is empty".to_string()));
    }
    if !(target_duration_minutes.is_finite()
        && target_duration_minutes > 0.0
        && target_duration_minutes <= MAX_DURATION_MINUTES)
    {
        return Err(PodcastError::InvalidRequest(format!(
            "target duration must be in (0, {MAX_DURATION_MINUTES}] minutes, got {target_duration_minutes}"
        )));
    }
    Ok(topic.to_string())
}

fn at(stage: Stage) -> impl Fn(PodcastError) -> GenerateError {
    move |error| GenerateError::new(stage, error)
}

fn checkpoint(cancel: &CancellationToken, stage: Stage) -> std::result::Result<(), GenerateError> {
    if cancel.is_cancelled() {
        return Err(GenerateError::new(stage, PodcastError::Cancelled));
    }
    Ok(())
}

pub struct PodcastPipeline {
    research: ResearchOrchestrator,
    script: ScriptSynthesizer,
    audio: AudioSynthesizer,
}

impl PodcastPipeline {
    pub fn new(
        research: ResearchOrchestrator,
        script: ScriptSynthesizer,
        audio: AudioSynthesizer,
    ) -> Self {
        Self {
            research,
            script,
            audio,
        }
    }

    /// Build the provider clients named in `cfg`. Missing API keys surface
    /// here as `PodcastError::Config`.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let llm_timeout = Duration::from_secs(cfg.llm.timeout_secs);
        let llm: Arc<dyn LanguageModel> = match cfg.llm.provider {
            LlmProvider::Anthropic => Arc::new(AnthropicModel::new(
                &cfg.llm.api_key,
                cfg.llm.model.as_deref(),
                llm_timeout,
            )?),
            LlmProvider::Openai => Arc::new(OpenAiModel::new(
                &cfg.llm.api_key,
                cfg.llm.model.as_deref(),
                llm_timeout,
            )?),
        };

        let tts_timeout = Duration::from_secs(cfg.tts.timeout_secs);
        let tts: Arc<dyn TtsProvider> = match cfg.tts.provider {
            TtsProviderKind::Elevenlabs => Arc::new(ElevenLabsTts::new(
                &cfg.tts.api_key,
                cfg.tts.voice_id.as_deref(),
                cfg.tts.model_id.as_deref(),
                cfg.tts.effective_max_chars(),
                tts_timeout,
            )?),
            TtsProviderKind::Openai => Arc::new(OpenAiTts::new(
                &cfg.tts.api_key,
                cfg.tts.voice_id.as_deref(),
                cfg.tts.model_id.as_deref(),
                cfg.tts.effective_max_chars(),
                tts_timeout,
            )?),
        };

        Ok(Self::new(
            ResearchOrchestrator::new(cfg.research_settings()),
            ScriptSynthesizer::new(llm, cfg.script_settings()),
            AudioSynthesizer::new(tts, cfg.audio_settings()),
        ))
    }

    /// Run all three stages for one topic. Either a complete `Episode` or a
    /// single stage-tagged error; a cancelled run yields no episode.
    pub async fn generate(
        &self,
        topic: &str,
        target_duration_minutes: f64,
        sources: &[Arc<dyn SourceAdapter>],
        cancel: &CancellationToken,
    ) -> std::result::Result<Episode, GenerateError> {
        ensure_metrics_described();
        counter!("pipeline_runs_total").increment(1);
        let t0 = Instant::now();

        let result = self
            .run(topic, target_duration_minutes, sources, cancel)
            .await;

        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &result {
            Ok(episode) => info!(
                target: "pipeline",
                id = %episode.id,
                words = episode.word_count,
                duration_seconds = episode.duration_seconds,
                sources = episode.sources_used.len(),
                elapsed_ms,
                "episode generated"
            ),
            Err(e) => {
                counter!("pipeline_failures_total", "stage" => e.stage.as_str()).increment(1);
                if e.is_cancelled() {
                    info!(target: "pipeline", stage = %e.stage, elapsed_ms, "generation cancelled");
                } else {
                    warn!(target: "pipeline", stage = %e.stage, error = %e.error, elapsed_ms, "generation failed");
                }
            }
        }
        result
    }

    async fn run(
        &self,
        topic: &str,
        target_duration_minutes: f64,
        sources: &[Arc<dyn SourceAdapter>],
        cancel: &CancellationToken,
    ) -> std::result::Result<Episode, GenerateError> {
        let topic = validate_request(topic, target_duration_minutes).map_err(at(Stage::Request))?;
        if sources.is_empty() {
            return Err(GenerateError::new(
                Stage::Request,
                PodcastError::InvalidRequest("no research sources configured".to_string()),
            ));
        }

        checkpoint(cancel, Stage::Research)?;
        let items = self
            .research
            .research(&topic, sources, cancel)
            .await
            .map_err(at(Stage::Research))?;

        checkpoint(cancel, Stage::Script)?;
        let script = tokio::select! {
            _ = cancel.cancelled() => Err(PodcastError::Cancelled),
            res = self.script.synthesize(&topic, &items, target_duration_minutes) => res,
        }
        .map_err(at(Stage::Script))?;

        checkpoint(cancel, Stage::Audio)?;
        let track = self
            .audio
            .synthesize(&script.text, cancel)
            .await
            .map_err(at(Stage::Audio))?;

        let generated_at = Utc::now();
        let id = text_digest(&format!(
            "{}\n{}\n{}",
            topic,
            generated_at.to_rfc3339(),
            script.text
        ));

        Ok(Episode {
            id,
            topic,
            script_text: script.text,
            audio_bytes: track.bytes,
            duration_seconds: track.duration_seconds,
            word_count: script.estimated_word_count,
            sources_used: items,
            target_duration_minutes,
            deviation: script.deviation,
            generated_at,
        })
    }
}
