//! Error types for the episode generation pipeline.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PodcastError {
    // Research stage
    #[error("source {source_name} unavailable: {message}")]
    SourceUnavailable { source_name: String, message: String },

    #[error("no research available for topic '{topic}'")]
    NoResearchAvailable { topic: String },

    // Script stage
    #[error("cannot write a script without research items")]
    EmptyResearchInput,

    #[error("language model unavailable: {message}")]
    LlmUnavailable { message: String },

    // Audio stage
    #[error("TTS provider unavailable: {message}")]
    TtsUnavailable { message: String },

    #[error("audio synthesis failed at segment {segment_index} after {attempts} attempts: {message}")]
    AudioSynthesisFailed {
        segment_index: usize,
        attempts: u32,
        message: String,
    },

    #[error("script is empty, nothing to synthesize")]
    EmptyScript,

    // Request / setup
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl PodcastError {
    pub fn source_unavailable(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn llm(message: impl fmt::Display) -> Self {
        Self::LlmUnavailable {
            message: message.to_string(),
        }
    }

    pub fn tts(message: impl fmt::Display) -> Self {
        Self::TtsUnavailable {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PodcastError>;

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Request,
    Research,
    Script,
    Audio,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Request => "request",
            Stage::Research => "research",
            Stage::Script => "script",
            Stage::Audio => "audio",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coordinator failure, tagged with the stage that produced it.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {error}")]
pub struct GenerateError {
    pub stage: Stage,
    #[source]
    pub error: PodcastError,
}

impl GenerateError {
    pub fn new(stage: Stage, error: PodcastError) -> Self {
        Self { stage, error }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, PodcastError::Cancelled)
    }
}
