// src/audio/mp3.rs
//! MP3 demuxing via symphonia: duration of a segment and its bare audio
//! frames for splicing.

use std::io::Cursor;

use symphonia::core::codecs::CODEC_TYPE_MP3;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Audio frames of one MP3 body. The Xing/Info header frame and any ID3v2
/// tag are not part of `frames`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mp3Stream {
    pub frames: Vec<u8>,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub duration_seconds: f64,
}

/// Length of a leading ID3v2 tag (header, body and optional footer), or 0.
pub fn id3v2_len(bytes: &[u8]) -> usize {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return 0;
    }
    // syncsafe: 7 bits per byte
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7F));
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    (10 + size + footer).min(bytes.len())
}

pub fn strip_id3v2(bytes: &[u8]) -> &[u8] {
    &bytes[id3v2_len(bytes)..]
}

/// Demux `bytes` as MPEG audio. None when symphonia finds no MP3 track or
/// no audio packets.
pub fn demux(bytes: &[u8]) -> Option<Mp3Stream> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");
    let format_opts = FormatOptions {
        enable_gapless: false,
        ..Default::default()
    };

    let probed = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &format_opts,
        &MetadataOptions::default(),
    ) {
        Ok(p) => p,
        Err(e) => {
            debug!(target: "audio", error = %e, bytes = bytes.len(), "not an mp3 stream");
            return None;
        }
    };

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec == CODEC_TYPE_MP3)?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate?;
    if sample_rate == 0 {
        return None;
    }

    let mut frames = Vec::with_capacity(bytes.len());
    let mut frame_count = 0usize;
    let mut samples = 0u64;
    // next_packet ends with an unexpected-EOF error at the end of the body
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        samples += packet.dur();
        frame_count += 1;
        frames.extend_from_slice(packet.buf());
    }
    if frame_count == 0 {
        return None;
    }

    Some(Mp3Stream {
        frames,
        frame_count,
        sample_rate,
        duration_seconds: samples as f64 / f64::from(sample_rate),
    })
}

/// Constant-bitrate estimate for bodies symphonia cannot demux.
pub fn estimate_from_bitrate(len: usize, kbps: u32) -> f64 {
    if kbps == 0 {
        return 0.0;
    }
    (len as f64 * 8.0) / (f64::from(kbps) * 1000.0)
}

// MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo, no CRC, no padding.
#[cfg(test)]
const TEST_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
#[cfg(test)]
pub(crate) const TEST_FRAME_LEN: usize = 417;
#[cfg(test)]
pub(crate) const TEST_FRAME_SECONDS: f64 = 1152.0 / 44_100.0;

/// `count` silent 417-byte frames.
#[cfg(test)]
pub(crate) fn test_frames(count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * TEST_FRAME_LEN);
    for _ in 0..count {
        let mut frame = vec![0u8; TEST_FRAME_LEN];
        frame[..4].copy_from_slice(&TEST_HEADER);
        out.extend_from_slice(&frame);
    }
    out
}

/// A LAME-style `Info` header frame announcing `frames` audio frames.
#[cfg(test)]
pub(crate) fn test_info_frame(frames: u32) -> Vec<u8> {
    let mut frame = vec![0u8; TEST_FRAME_LEN];
    frame[..4].copy_from_slice(&TEST_HEADER);
    // tag sits after 32 bytes of stereo side info
    frame[36..40].copy_from_slice(b"Info");
    frame[40..44].copy_from_slice(&1u32.to_be_bytes());
    frame[44..48].copy_from_slice(&frames.to_be_bytes());
    frame
}

#[cfg(test)]
pub(crate) fn test_id3_tag(body: &[u8]) -> Vec<u8> {
    let mut tag = b"ID3\x04\x00\x00".to_vec();
    let n = body.len() as u32;
    tag.extend([(n >> 21) as u8 & 0x7F, (n >> 14) as u8 & 0x7F, (n >> 7) as u8 & 0x7F, n as u8 & 0x7F]);
    tag.extend_from_slice(body);
    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_sums_audio_frames() {
        let s = demux(&test_frames(10)).unwrap();
        assert_eq!(s.frame_count, 10);
        assert_eq!(s.sample_rate, 44_100);
        assert!((s.duration_seconds - 10.0 * TEST_FRAME_SECONDS).abs() < 1e-9);
        assert_eq!(s.frames, test_frames(10));
    }

    #[test]
    fn info_header_frame_is_not_audio() {
        let mut bytes = test_info_frame(10);
        bytes.extend(test_frames(10));
        let s = demux(&bytes).unwrap();
        assert_eq!(s.frame_count, 10);
        assert!((s.duration_seconds - 10.0 * TEST_FRAME_SECONDS).abs() < 1e-9);
        assert_eq!(s.frames, test_frames(10));
    }

    #[test]
    fn id3_tag_is_skipped_and_stripped() {
        let mut bytes = test_id3_tag(&[0u8; 5]);
        bytes.extend(test_frames(2));
        assert_eq!(id3v2_len(&bytes), 15);
        assert_eq!(strip_id3v2(&bytes).len(), 2 * TEST_FRAME_LEN);
        let s = demux(&bytes).unwrap();
        assert_eq!(s.frames, test_frames(2));
        assert!((s.duration_seconds - 2.0 * TEST_FRAME_SECONDS).abs() < 1e-9);
    }

    #[test]
    fn garbage_does_not_demux() {
        assert_eq!(demux(b"not audio at all"), None);
        assert_eq!(demux(&[0u8; 4_096]), None);
        assert!((estimate_from_bitrate(16_000, 128) - 1.0).abs() < 1e-9);
    }
}
