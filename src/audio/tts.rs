// src/audio/tts.rs
//! Text-to-speech clients. One call per segment; retries live in the
//! synthesizer, not here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::audio::mp3;
use crate::config::{ELEVENLABS_MAX_CHARS, OPENAI_TTS_MAX_CHARS};
use crate::error::{PodcastError, Result};

pub const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";
pub const DEFAULT_ELEVENLABS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";
const ELEVENLABS_OUTPUT_FORMAT: &str = "mp3_44100_128";

pub const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
pub const DEFAULT_OPENAI_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_OPENAI_VOICE: &str = "alloy";

/// Both providers are asked for 128 kbps MP3.
const NOMINAL_KBPS: u32 = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub duration_seconds: f64,
}

impl SynthesizedAudio {
    /// Measure by demuxing; fall back to the nominal bitrate.
    pub fn from_mp3(bytes: Vec<u8>) -> Self {
        let duration_seconds = match mp3::demux(&bytes) {
            Some(stream) => stream.duration_seconds,
            None => mp3::estimate_from_bitrate(bytes.len(), NOMINAL_KBPS),
        };
        Self {
            bytes,
            duration_seconds,
        }
    }
}

/// A single-voice speech engine returning MP3.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
    /// Longest input accepted by one request, in characters.
    fn max_input_chars(&self) -> usize;
    fn provider_name(&self) -> &'static str;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("podcast-generator/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| PodcastError::Config(format!("building tts http client: {e}")))
}

async fn read_audio(resp: reqwest::Response) -> Result<SynthesizedAudio> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(300).collect();
        return Err(PodcastError::tts(format!("HTTP {status}: {excerpt}")));
    }
    let bytes = resp.bytes().await.map_err(PodcastError::tts)?;
    if bytes.is_empty() {
        return Err(PodcastError::tts("empty audio response"));
    }
    Ok(SynthesizedAudio::from_mp3(bytes.to_vec()))
}

pub struct ElevenLabsTts {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    voice_id: String,
    model_id: String,
    max_chars: usize,
}

impl ElevenLabsTts {
    pub fn new(
        api_key: &str,
        voice_id: Option<&str>,
        model_id: Option<&str>,
        max_chars: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PodcastError::Config(
                "missing ELEVENLABS_API_KEY for audio synthesis".to_string(),
            ));
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_base: ELEVENLABS_API_BASE.to_string(),
            api_key: api_key.trim().to_string(),
            voice_id: voice_id.unwrap_or(DEFAULT_ELEVENLABS_VOICE).to_string(),
            model_id: model_id.unwrap_or(DEFAULT_ELEVENLABS_MODEL).to_string(),
            max_chars: max_chars.clamp(1, ELEVENLABS_MAX_CHARS),
        })
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        #[derive(Serialize)]
        struct Req<'a> {
            text: &'a str,
            model_id: &'a str,
        }
        let url = format!("{}/v1/text-to-speech/{}", self.api_base, self.voice_id);
        let resp = self
            .http
            .post(url)
            .query(&[("output_format", ELEVENLABS_OUTPUT_FORMAT)])
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&Req {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .map_err(PodcastError::tts)?;
        read_audio(resp).await
    }

    fn max_input_chars(&self) -> usize {
        self.max_chars
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}

pub struct OpenAiTts {
    http: reqwest::Client,
    api_key: String,
    model: String,
    voice: String,
    max_chars: usize,
}

impl OpenAiTts {
    pub fn new(
        api_key: &str,
        voice: Option<&str>,
        model: Option<&str>,
        max_chars: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PodcastError::Config(
                "missing OPENAI_API_KEY for audio synthesis".to_string(),
            ));
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_key: api_key.trim().to_string(),
            model: model.unwrap_or(DEFAULT_OPENAI_TTS_MODEL).to_string(),
            voice: voice.unwrap_or(DEFAULT_OPENAI_VOICE).to_string(),
            max_chars: max_chars.clamp(1, OPENAI_TTS_MAX_CHARS),
        })
    }
}

#[async_trait]
impl TtsProvider for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            voice: &'a str,
            input: &'a str,
            response_format: &'a str,
        }
        let resp = self
            .http
            .post(OPENAI_SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&Req {
                model: &self.model,
                voice: &self.voice,
                input: text,
                response_format: "mp3",
            })
            .send()
            .await
            .map_err(PodcastError::tts)?;
        read_audio(resp).await
    }

    fn max_input_chars(&self) -> usize {
        self.max_chars
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_body_uses_bitrate_estimate() {
        let audio = SynthesizedAudio::from_mp3(vec![0u8; 32_000]);
        assert!((audio.duration_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn framed_body_is_measured() {
        let mut body = mp3::test_info_frame(100);
        body.extend(mp3::test_frames(100));
        let audio = SynthesizedAudio::from_mp3(body);
        assert!((audio.duration_seconds - 100.0 * mp3::TEST_FRAME_SECONDS).abs() < 1e-9);
    }

    #[test]
    fn char_limits_are_clamped_to_provider_caps() {
        let t = ElevenLabsTts::new("k", None, None, 50_000, Duration::from_secs(5)).unwrap();
        assert_eq!(t.max_input_chars(), ELEVENLABS_MAX_CHARS);
        let o = OpenAiTts::new("k", None, None, 1_000, Duration::from_secs(5)).unwrap();
        assert_eq!(o.max_input_chars(), 1_000);
        assert!(matches!(
            OpenAiTts::new(" ", None, None, 1_000, Duration::from_secs(5)).err(),
            Some(PodcastError::Config(_))
        ));
    }
}
