// src/script/mod.rs
//! Script stage: one language-model call turns ranked research into a spoken
//! monologue sized to the target duration, with at most one corrective turn.

pub mod llm;

use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PodcastError, Result};
use crate::research::types::ResearchItem;
use crate::script::llm::{ChatMessage, CompletionRequest, LanguageModel};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "script_corrective_retries_total",
            "Second LLM turns asking to expand or condense a draft."
        );
        describe_counter!(
            "script_out_of_tolerance_total",
            "Scripts surfaced outside the word-count band."
        );
    });
}

#[derive(Debug, Clone)]
pub struct ScriptSettings {
    pub words_per_minute: u32,
    /// Accepted deviation from the target word count, in percent.
    pub tolerance_pct: u32,
    pub max_tokens: u32,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            words_per_minute: 150,
            tolerance_pct: 15,
            max_tokens: 8_000,
        }
    }
}

/// Word-count contract for one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WordTarget {
    pub target: u32,
    pub lower: u32,
    pub upper: u32,
}

impl WordTarget {
    pub fn new(minutes: f64, words_per_minute: u32, tolerance_pct: u32) -> Self {
        let target = (minutes * f64::from(words_per_minute)).round().max(1.0) as u32;
        let tol = u64::from(tolerance_pct.min(99));
        let t = u64::from(target);
        Self {
            target,
            lower: (t * (100 - tol) / 100) as u32,
            upper: (t * (100 + tol)).div_ceil(100) as u32,
        }
    }

    pub fn contains(&self, words: u32) -> bool {
        (self.lower..=self.upper).contains(&words)
    }

    pub fn distance(&self, words: u32) -> u32 {
        words.abs_diff(self.target)
    }
}

/// Non-fatal flag: the surfaced script missed the word-count band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurationOutOfTolerance {
    pub word_count: u32,
    pub target: u32,
    pub lower: u32,
    pub upper: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    pub text: String,
    pub estimated_word_count: u32,
    pub target: WordTarget,
    /// LLM calls made (1 or 2).
    pub attempts: u32,
    pub deviation: Option<DurationOutOfTolerance>,
}

pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

fn format_minutes(minutes: f64) -> String {
    if minutes.fract() == 0.0 {
        format!("{minutes:.0}")
    } else {
        format!("{minutes:.1}")
    }
}

pub fn system_prompt(minutes: f64, wpm: u32, target: &WordTarget) -> String {
    format!(
        "You are a podcast script writer. You turn research notes into an engaging spoken monologue.

Your scripts should:
- Be conversational and engaging, as if explaining to a curious friend
- Break down complex concepts into digestible pieces
- Include specific insights from the research notes and attribute them naturally when speaking (for example: \"a recent arXiv paper found...\")
- Only state facts that are supported by the research notes
- Be approximately {minutes} minutes when read aloud (~{wpm} words per minute)
- NOT include speaker labels, timestamps, headings, or production notes
- Flow naturally as a single-narrator monologue

Target length: approximately {words} words (acceptable range {lower}-{upper}).
Return only the script text.",
        minutes = format_minutes(minutes),
        words = target.target,
        lower = target.lower,
        upper = target.upper,
    )
}

/// Numbered digest of the ranked items; `[n]` is the citation marker.
pub fn research_digest(items: &[ResearchItem]) -> String {
    let mut out = String::new();
    for (i, it) in items.iter().enumerate() {
        let date = it
            .published_at
            .map(|d| format!(", {}", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        out.push_str(&format!("[{}] ({}{}) {}\n", i + 1, it.source_type, date, it.title));
        if !it.authors.is_empty() {
            let shown: Vec<&str> = it.authors.iter().take(3).map(String::as_str).collect();
            let more = if it.authors.len() > 3 { " et al." } else { "" };
            out.push_str(&format!("    Authors: {}{}\n", shown.join(", "), more));
        }
        if !it.summary.is_empty() {
            out.push_str(&format!("    {}\n", it.summary));
        }
        if !it.url.is_empty() {
            out.push_str(&format!("    Source: {}\n", it.url));
        }
    }
    out
}

pub fn user_prompt(topic: &str, minutes: f64, target: &WordTarget, items: &[ResearchItem]) -> String {
    format!(
        "Write a {m}-minute podcast script (~{w} words) about \"{topic}\" based on the research notes below.\n\nResearch notes:\n{digest}",
        m = format_minutes(minutes),
        w = target.target,
        digest = research_digest(items),
    )
}

pub fn corrective_prompt(words: u32, target: &WordTarget) -> String {
    if words < target.lower {
        format!(
            "Your draft is {words} words, but the episode needs about {t} words ({l}-{u}). \
Expand it to about {t} words by going deeper into the research notes: more explanation, examples and context. \
Do not invent facts. Return the complete revised script only.",
            t = target.target,
            l = target.lower,
            u = target.upper,
        )
    } else {
        format!(
            "Your draft is {words} words, but the episode needs about {t} words ({l}-{u}). \
Condense it to about {t} words, keeping the most important insights. \
Return the complete revised script only.",
            t = target.target,
            l = target.lower,
            u = target.upper,
        )
    }
}

/// Trim, drop a leading markdown heading, strip `Host:`-style speaker labels.
pub fn clean_script(raw: &str) -> String {
    static RE_HEADING: OnceCell<Regex> = OnceCell::new();
    static RE_SPEAKER: OnceCell<Regex> = OnceCell::new();
    let re_heading = RE_HEADING.get_or_init(|| Regex::new(r"\A\s*#{1,6}[^\n]*\n+").unwrap());
    let re_speaker = RE_SPEAKER.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*\**(?:host|narrator|speaker(?: \d+)?)\**[ \t]*:\**[ \t]*").unwrap()
    });
    let text = re_heading.replace(raw, "");
    let text = re_speaker.replace_all(&text, "");
    text.trim().to_string()
}

pub struct ScriptSynthesizer {
    llm: Arc<dyn LanguageModel>,
    settings: ScriptSettings,
}

impl ScriptSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: ScriptSettings) -> Self {
        Self { llm, settings }
    }

    pub fn word_target(&self, minutes: f64) -> WordTarget {
        WordTarget::new(
            minutes,
            self.settings.words_per_minute,
            self.settings.tolerance_pct,
        )
    }

    async fn complete_clean(&self, request: &CompletionRequest) -> Result<String> {
        let text = clean_script(&self.llm.complete(request).await?);
        if text.is_empty() {
            return Err(PodcastError::llm("completion contained no script text"));
        }
        Ok(text)
    }

    pub async fn synthesize(
        &self,
        topic: &str,
        items: &[ResearchItem],
        target_duration_minutes: f64,
    ) -> Result<Script> {
        ensure_metrics_described();
        if items.is_empty() {
            return Err(PodcastError::EmptyResearchInput);
        }
        if !(target_duration_minutes.is_finite() && target_duration_minutes > 0.0) {
            return Err(PodcastError::InvalidRequest(format!(
                "target duration must be positive, got {target_duration_minutes}"
            )));
        }

        let target = self.word_target(target_duration_minutes);
        let mut request = CompletionRequest {
            system: system_prompt(
                target_duration_minutes,
                self.settings.words_per_minute,
                &target,
            ),
            messages: vec![ChatMessage::user(user_prompt(
                topic,
                target_duration_minutes,
                &target,
                items,
            ))],
            max_tokens: self.settings.max_tokens,
        };

        let first = self.complete_clean(&request).await?;
        let first_words = count_words(&first);
        info!(
            target: "script",
            provider = self.llm.provider_name(),
            words = first_words,
            target_words = target.target,
            "draft received"
        );
        if target.contains(first_words) {
            return Ok(Script {
                text: first,
                estimated_word_count: first_words,
                target,
                attempts: 1,
                deviation: None,
            });
        }

        counter!("script_corrective_retries_total").increment(1);
        request.messages.push(ChatMessage::assistant(first.clone()));
        request
            .messages
            .push(ChatMessage::user(corrective_prompt(first_words, &target)));
        let second = self.complete_clean(&request).await?;
        let second_words = count_words(&second);

        let (text, words) = if target.distance(second_words) <= target.distance(first_words) {
            (second, second_words)
        } else {
            (first, first_words)
        };

        let deviation = if target.contains(words) {
            None
        } else {
            counter!("script_out_of_tolerance_total").increment(1);
            warn!(
                target: "script",
                words,
                lower = target.lower,
                upper = target.upper,
                "script outside word-count band after corrective turn"
            );
            Some(DurationOutOfTolerance {
                word_count: words,
                target: target.target,
                lower: target.lower,
                upper: target.upper,
            })
        };

        Ok(Script {
            text,
            estimated_word_count: words,
            target,
            attempts: 2,
            deviation,
        })
    }
}
