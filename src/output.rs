// src/output.rs
//! Persist a finished episode: `<slug>_<YYYYMMDD_HHMMSS>.mp3` plus a JSON
//! metadata sidecar. Both are staged as temp files and renamed into place
//! only once both writes succeed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::pipeline::Episode;

const MAX_SLUG_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEpisode {
    pub audio_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Lowercase ASCII alphanumerics joined by single underscores.
pub fn topic_slug(topic: &str) -> String {
    let mut slug = String::new();
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let mut slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("episode");
    }
    slug
}

pub fn episode_stem(episode: &Episode) -> String {
    format!(
        "{}_{}",
        topic_slug(&episode.topic),
        episode.generated_at.format("%Y%m%d_%H%M%S")
    )
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `bytes` next to `path` as `<path>.tmp`. The temp file is removed if
/// the write fails.
fn write_tmp(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let tmp = tmp_path(path);
    let written = fs::File::create(&tmp)
        .with_context(|| format!("creating {}", tmp.display()))
        .and_then(|mut f| {
            f.write_all(bytes)
                .with_context(|| format!("writing {}", tmp.display()))?;
            f.sync_all().ok();
            Ok(())
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

/// Both files are staged before either is renamed; the sidecar goes first so
/// an `.mp3` under its final name always has metadata beside it.
pub fn save_episode(episode: &Episode, dir: &Path) -> Result<SavedEpisode> {
    fs::create_dir_all(dir).with_context(|| format!("creating output dir {}", dir.display()))?;
    let stem = episode_stem(episode);
    let audio_path = dir.join(format!("{stem}.mp3"));
    let metadata_path = dir.join(format!("{stem}.json"));
    let json = serde_json::to_vec_pretty(episode).context("serializing episode metadata")?;

    let audio_tmp = write_tmp(&audio_path, &episode.audio_bytes)?;
    let metadata_tmp = match write_tmp(&metadata_path, &json) {
        Ok(t) => t,
        Err(e) => {
            let _ = fs::remove_file(&audio_tmp);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&metadata_tmp, &metadata_path) {
        let _ = fs::remove_file(&metadata_tmp);
        let _ = fs::remove_file(&audio_tmp);
        return Err(e).with_context(|| format!("renaming into {}", metadata_path.display()));
    }
    if let Err(e) = fs::rename(&audio_tmp, &audio_path) {
        let _ = fs::remove_file(&audio_tmp);
        let _ = fs::remove_file(&metadata_path);
        return Err(e).with_context(|| format!("renaming into {}", audio_path.display()));
    }

    tracing::info!(
        target: "output",
        audio = %audio_path.display(),
        bytes = episode.audio_bytes.len(),
        "episode saved"
    );
    Ok(SavedEpisode {
        audio_path,
        metadata_path,
    })
}
