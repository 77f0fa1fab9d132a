// src/audio/segment.rs
//! Script segmentation under the TTS provider's per-request character limit.
//!
//! Chunks end at sentence or paragraph breaks, each as long as the limit
//! allows. Concatenating `text_chunk`s in index order yields the script
//! byte-for-byte. A sentence longer than the limit falls back to word
//! boundaries; a single word longer than the limit is cut at char boundaries.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioSegment {
    pub index: usize,
    pub text_chunk: String,
    /// Provider input limit the chunk was sized for, in characters.
    pub byte_length_limit: usize,
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}')
}

fn is_closer(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}' | '\u{00BB}'
    )
}

/// Split into sentence units; each unit carries its trailing whitespace.
/// A newline always closes a unit (paragraph and line breaks).
pub(crate) fn sentence_units(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((_, c)) = iter.next() {
        let boundary = if c == '\n' {
            true
        } else if is_terminator(c) {
            while let Some(&(_, n)) = iter.peek() {
                if is_terminator(n) || is_closer(n) {
                    iter.next();
                } else {
                    break;
                }
            }
            match iter.peek() {
                None => true,
                Some(&(_, n)) => n.is_whitespace(),
            }
        } else {
            false
        };
        if !boundary {
            continue;
        }

        while let Some(&(_, n)) = iter.peek() {
            if n.is_whitespace() {
                iter.next();
            } else {
                break;
            }
        }
        let end = iter.peek().map(|&(j, _)| j).unwrap_or(text.len());
        units.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

/// Word pieces, each with its trailing whitespace (leading whitespace sticks
/// to the first piece).
fn word_units(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut seen_word = false;
    let mut in_ws = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_ws = seen_word;
        } else {
            if in_ws {
                pieces.push(&text[start..i]);
                start = i;
                in_ws = false;
            }
            seen_word = true;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (i, _) in text.char_indices() {
        if count == max_chars {
            pieces.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

struct Packer {
    max_chars: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn push(&mut self, piece: &str, len: usize) {
        if self.current_len + len > self.max_chars {
            self.flush();
        }
        self.current.push_str(piece);
        self.current_len += len;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }
}

/// Split `text` into ordered segments of at most `max_chars` characters.
/// A blank script yields no segments.
pub fn split_script(text: &str, max_chars: usize) -> Vec<AudioSegment> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    let mut packer = Packer {
        max_chars,
        chunks: Vec::new(),
        current: String::new(),
        current_len: 0,
    };

    for unit in sentence_units(text) {
        let len = unit.chars().count();
        if len <= max_chars {
            packer.push(unit, len);
            continue;
        }
        packer.flush();
        for word in word_units(unit) {
            for piece in hard_split(word, max_chars) {
                packer.push(piece, piece.chars().count());
            }
        }
    }
    packer.flush();

    packer
        .chunks
        .into_iter()
        .enumerate()
        .map(|(index, text_chunk)| AudioSegment {
            index,
            text_chunk,
            byte_length_limit: max_chars,
        })
        .collect()
}
