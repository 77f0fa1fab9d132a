// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod audio;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod research;
pub mod script;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::error::{GenerateError, PodcastError, Stage};
pub use crate::pipeline::{Episode, PodcastPipeline};
pub use crate::research::types::{ResearchItem, SourceAdapter, SourceQuery, SourceType};

use sha2::{Digest, Sha256};

/// Short SHA-256 hex digest; identifies text in logs without logging it.
pub(crate) fn text_digest(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}
