// src/config/mod.rs
//! Application configuration: one explicit struct, loaded from TOML and
//! threaded into the pipeline at construction.

pub mod sources;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::audio::{AudioSettings, RetryPolicy};
use crate::pipeline::MAX_DURATION_MINUTES;
use crate::research::ResearchSettings;
use crate::script::ScriptSettings;

pub use sources::{default_sources, SourceConfig};

pub const ENV_CONFIG_PATH: &str = "PODCAST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/podcast.toml";

pub const DEFAULT_WORDS_PER_MINUTE: u32 = 150;
pub const DEFAULT_TOLERANCE_PCT: u32 = 15;
pub const ELEVENLABS_MAX_CHARS: usize = 5_000;
pub const OPENAI_TTS_MAX_CHARS: usize = 4_096;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Anthropic,
    Openai,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderKind {
    Elevenlabs,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Provider default when absent.
    pub model: Option<String>,
    /// "ENV" or empty means: read ANTHROPIC_API_KEY / OPENAI_API_KEY.
    pub api_key: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            model: None,
            api_key: "ENV".to_string(),
            max_tokens: 8_000,
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: TtsProviderKind,
    /// "ENV" or empty means: read ELEVENLABS_API_KEY / OPENAI_API_KEY.
    pub api_key: String,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    /// Per-request character limit; provider default when absent.
    pub max_chars: Option<usize>,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProviderKind::Elevenlabs,
            api_key: "ENV".to_string(),
            voice_id: None,
            model_id: None,
            max_chars: None,
            max_concurrent: 3,
            max_attempts: 3,
            backoff_ms: 500,
            timeout_secs: 90,
        }
    }
}

impl TtsConfig {
    pub fn effective_max_chars(&self) -> usize {
        let provider_cap = match self.provider {
            TtsProviderKind::Elevenlabs => ELEVENLABS_MAX_CHARS,
            TtsProviderKind::Openai => OPENAI_TTS_MAX_CHARS,
        };
        self.max_chars
            .filter(|&c| c > 0)
            .map(|c| c.min(provider_cap))
            .unwrap_or(provider_cap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub words_per_minute: u32,
    pub tolerance_pct: u32,
    pub default_duration_minutes: f64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            tolerance_pct: DEFAULT_TOLERANCE_PCT,
            default_duration_minutes: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub max_concurrent: usize,
    pub source_timeout_secs: u64,
    pub max_results_per_source: usize,
    pub max_items: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            source_timeout_secs: 20,
            max_results_per_source: 5,
            max_items: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("audio"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub tts: TtsConfig,
    pub script: ScriptConfig,
    pub research: ResearchConfig,
    pub output: OutputConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            script: ScriptConfig::default(),
            research: ResearchConfig::default(),
            output: OutputConfig::default(),
            sources: default_sources(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML file, then sanitize and resolve secrets from the environment.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        cfg.finish();
        Ok(cfg)
    }

    /// Load config using explicit path + fallbacks:
    /// 1) `explicit`
    /// 2) $PODCAST_CONFIG_PATH (must exist when set)
    /// 3) config/podcast.toml
    /// 4) built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from_file(p);
        }
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from_file(&default_p);
        }
        let mut cfg = AppConfig::default();
        cfg.finish();
        Ok(cfg)
    }

    fn finish(&mut self) {
        self.sanitize();
        self.resolve_secrets();
    }

    fn sanitize(&mut self) {
        if self.script.words_per_minute == 0 {
            self.script.words_per_minute = DEFAULT_WORDS_PER_MINUTE;
        }
        if self.script.tolerance_pct == 0 || self.script.tolerance_pct >= 100 {
            self.script.tolerance_pct = DEFAULT_TOLERANCE_PCT;
        }
        let d = self.script.default_duration_minutes;
        if !d.is_finite() || d <= 0.0 || d > MAX_DURATION_MINUTES {
            self.script.default_duration_minutes = ScriptConfig::default().default_duration_minutes;
        }
        if self.tts.max_attempts == 0 {
            self.tts.max_attempts = 3;
        }
        self.tts.max_concurrent = self.tts.max_concurrent.max(1);
        self.research.max_concurrent = self.research.max_concurrent.max(1);
        self.research.max_results_per_source = self.research.max_results_per_source.max(1);
        self.research.max_items = self.research.max_items.max(1);
        if self.research.source_timeout_secs == 0 {
            self.research.source_timeout_secs = ResearchConfig::default().source_timeout_secs;
        }
    }

    /// Replace "ENV"/empty keys with environment values. Missing variables
    /// leave the key empty; the pipeline builder reports it.
    fn resolve_secrets(&mut self) {
        if needs_env(&self.llm.api_key) {
            let var = match self.llm.provider {
                LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
                LlmProvider::Openai => "OPENAI_API_KEY",
            };
            self.llm.api_key = env::var(var).unwrap_or_default();
        }
        if needs_env(&self.tts.api_key) {
            let var = match self.tts.provider {
                TtsProviderKind::Elevenlabs => "ELEVENLABS_API_KEY",
                TtsProviderKind::Openai => "OPENAI_API_KEY",
            };
            self.tts.api_key = env::var(var).unwrap_or_default();
        }
        if let Ok(voice) = env::var("ELEVENLABS_VOICE_ID") {
            if self.tts.provider == TtsProviderKind::Elevenlabs && !voice.trim().is_empty() {
                self.tts.voice_id = Some(voice.trim().to_string());
            }
        }
    }

    pub fn research_settings(&self) -> ResearchSettings {
        ResearchSettings {
            max_concurrent: self.research.max_concurrent,
            source_timeout: Duration::from_secs(self.research.source_timeout_secs),
            max_results_per_source: self.research.max_results_per_source,
            max_items: self.research.max_items,
        }
    }

    pub fn script_settings(&self) -> ScriptSettings {
        ScriptSettings {
            words_per_minute: self.script.words_per_minute,
            tolerance_pct: self.script.tolerance_pct,
            max_tokens: self.llm.max_tokens,
        }
    }

    pub fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            max_concurrent: self.tts.max_concurrent,
            retry: RetryPolicy {
                max_attempts: self.tts.max_attempts,
                base_delay: Duration::from_millis(self.tts.backoff_ms),
            },
        }
    }
}

fn needs_env(key: &str) -> bool {
    let k = key.trim();
    k.is_empty() || k.eq_ignore_ascii_case("env")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_out_of_range_values() {
        let mut cfg: AppConfig = toml::from_str(
            r#"
[script]
words_per_minute = 0
tolerance_pct = 250

[tts]
max_attempts = 0
max_concurrent = 0
"#,
        )
        .unwrap();
        cfg.sanitize();
        assert_eq!(cfg.script.words_per_minute, 150);
        assert_eq!(cfg.script.tolerance_pct, 15);
        assert_eq!(cfg.tts.max_attempts, 3);
        assert_eq!(cfg.tts.max_concurrent, 1);
    }

    #[test]
    fn unusable_default_duration_falls_back() {
        for raw in ["inf", "-inf", "nan", "0.0", "-3.0", "61.0"] {
            let mut cfg: AppConfig =
                toml::from_str(&format!("[script]\ndefault_duration_minutes = {raw}\n")).unwrap();
            cfg.sanitize();
            assert_eq!(cfg.script.default_duration_minutes, 5.0, "input {raw}");
        }

        let mut cfg: AppConfig =
            toml::from_str("[script]\ndefault_duration_minutes = 60.0\n").unwrap();
        cfg.sanitize();
        assert_eq!(cfg.script.default_duration_minutes, 60.0);
    }

    #[test]
    fn max_chars_is_capped_by_provider_limit() {
        let mut tts = TtsConfig::default();
        assert_eq!(tts.effective_max_chars(), ELEVENLABS_MAX_CHARS);
        tts.max_chars = Some(9_999);
        assert_eq!(tts.effective_max_chars(), ELEVENLABS_MAX_CHARS);
        tts.max_chars = Some(1_200);
        assert_eq!(tts.effective_max_chars(), 1_200);
        tts.provider = TtsProviderKind::Openai;
        tts.max_chars = None;
        assert_eq!(tts.effective_max_chars(), OPENAI_TTS_MAX_CHARS);
    }

    #[test]
    fn empty_file_yields_defaults_with_default_sources() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.llm.provider, LlmProvider::Anthropic);
        assert_eq!(cfg.sources, default_sources());
        assert_eq!(cfg.output.dir, PathBuf::from("audio"));
    }
}
