//! Transcript loading.
//!
//! Accepts the speech-to-text output as JSON (a segment array, or an
//! object with a `segments` array) or as WebVTT captions.

use regex::Regex;
use std::sync::LazyLock;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use fitclip_models::TranscriptSegment;

use crate::error::WorkerResult;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Segments(Vec<TranscriptSegment>),
    Wrapped { segments: Vec<TranscriptSegment> },
}

/// Load a transcript file, choosing the format by extension.
pub async fn load_transcript(path: &Path) -> WorkerResult<Vec<TranscriptSegment>> {
    let content = tokio::fs::read_to_string(path).await?;
    let is_vtt = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("vtt"))
        .unwrap_or(false);

    let segments = if is_vtt {
        parse_vtt(&content)
    } else {
        parse_transcript_json(&content)?
    };

    info!(
        path = %path.display(),
        segments = segments.len(),
        "Loaded transcript"
    );
    Ok(segments)
}

pub fn parse_transcript_json(content: &str) -> WorkerResult<Vec<TranscriptSegment>> {
    let file: TranscriptFile = serde_json::from_str(content)?;
    Ok(match file {
        TranscriptFile::Segments(segments) | TranscriptFile::Wrapped { segments } => segments,
    })
}

static VTT_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:\d+:)?\d{2}:\d{2}\.\d{3})\s+-->\s+((?:\d+:)?\d{2}:\d{2}\.\d{3})").unwrap()
});
static VTT_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// `HH:MM:SS.mmm` or `MM:SS.mmm` to seconds.
fn vtt_seconds(ts: &str) -> Option<f64> {
    let mut seconds = 0.0;
    for part in ts.split(':') {
        seconds = seconds * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(seconds)
}

/// Parse WebVTT cues into segments.
///
/// Markup is stripped and rolling captions repeating the previous line are
/// dropped.
pub fn parse_vtt(content: &str) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = Vec::new();
    let mut cue: Option<(f64, f64)> = None;
    let mut text: Vec<String> = Vec::new();
    let mut last_line = String::new();

    let mut flush = |cue: &mut Option<(f64, f64)>, text: &mut Vec<String>| {
        if let Some((start, end)) = cue.take() {
            if !text.is_empty() {
                segments.push(TranscriptSegment::new(start, end, text.join(" ")));
            }
        }
        text.clear();
    };

    for raw in content.lines() {
        let line = VTT_TAG.replace_all(raw.trim(), "").trim().to_string();

        if let Some(caps) = VTT_CUE.captures(&line) {
            flush(&mut cue, &mut text);
            cue = vtt_seconds(&caps[1]).zip(vtt_seconds(&caps[2]));
            continue;
        }

        if line.is_empty() {
            flush(&mut cue, &mut text);
            continue;
        }

        // Header, cue numbers and lines outside a cue
        if cue.is_none() || line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        if line != last_line {
            text.push(line.clone());
            last_line = line;
        }
    }
    flush(&mut cue, &mut text);

    segments
}
