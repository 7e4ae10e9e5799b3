//! Exercise labeler boundary.
//!
//! The labeler itself (a multimodal model) lives outside this crate. This
//! module builds the request it receives, parses the JSON it answers with,
//! and converts the loosely typed records into [`ExerciseInterval`]s.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use fitclip_media::Keyframe;
use fitclip_models::{transcript_covers_video, ExerciseInterval, TranscriptSegment};

use crate::error::{WorkerError, WorkerResult};

/// Everything the labeler gets for one video.
#[derive(Debug, Clone, Serialize)]
pub struct LabelerRequest {
    pub keyframes: Vec<Keyframe>,
    pub video_duration_s: f64,
    /// One line per keyframe, in keyframe order
    pub frame_explanations: Vec<String>,
    /// Full transcript, kept for transcript-only fallbacks
    pub transcript: Vec<TranscriptSegment>,
    /// Whether the transcript is forwarded to the model
    pub transcript_is_meaningful: bool,
}

impl LabelerRequest {
    pub fn build(
        keyframes: &[Keyframe],
        video_duration_s: f64,
        transcript: &[TranscriptSegment],
    ) -> Self {
        let frame_explanations = keyframes
            .iter()
            .enumerate()
            .map(|(idx, k)| {
                format!(
                    "{}. Cut {}, Time {:.3}s",
                    idx + 1,
                    k.segment_id,
                    k.timestamp_s()
                )
            })
            .collect();

        let transcript_is_meaningful = transcript_covers_video(transcript, video_duration_s);
        if !transcript.is_empty() && !transcript_is_meaningful {
            info!(
                segments = transcript.len(),
                video_duration_s,
                "Transcript does not cover the video, leaving it out of the request"
            );
        }

        Self {
            keyframes: keyframes.to_vec(),
            video_duration_s,
            frame_explanations,
            transcript: transcript.to_vec(),
            transcript_is_meaningful,
        }
    }

    /// Transcript lines as sent to the model, if it is meaningful.
    pub fn transcript_text(&self) -> Option<String> {
        if !self.transcript_is_meaningful {
            return None;
        }
        let lines: Vec<String> = self
            .transcript
            .iter()
            .map(|s| format!("[{:.1}s - {:.1}s] {}", s.start, s.end, s.text.trim()))
            .collect();
        Some(lines.join("\n"))
    }

    /// Prompt text accompanying the keyframe images.
    pub fn prompt(&self) -> String {
        let frames = self.frame_explanations.join("\n");
        let transcript = match self.transcript_text() {
            Some(text) => format!("\nTRANSCRIPT:\n{}\n", text),
            None => String::new(),
        };

        format!(
            r#"The attached images are keyframes from a {duration:.1}s workout video.
Each frame is listed with the cut (shot) it belongs to and its timestamp:
{frames}
{transcript}
Identify every exercise performed and when it starts and ends.
Return ONLY a single JSON object with this schema:
{{
  "exercises": [
    {{
      "exercise_name": "Exercise name",
      "start_time": 0.0,
      "end_time": 0.0,
      "confidence_score": 0.0
    }}
  ]
}}
Times are in seconds from the start of the video; confidence is between 0 and 1.
"#,
            duration = self.video_duration_s,
        )
    }
}

/// One exercise record as the labeler returned it.
///
/// Times may arrive as numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawExerciseInterval {
    #[serde(default, alias = "name")]
    pub exercise_name: Option<String>,
    #[serde(default)]
    pub start_time: Value,
    #[serde(default)]
    pub end_time: Value,
    #[serde(default, alias = "confidence")]
    pub confidence_score: Value,
}

impl RawExerciseInterval {
    pub fn new(name: &str, start_time: f64, end_time: f64, confidence: f64) -> Self {
        Self {
            exercise_name: Some(name.to_string()),
            start_time: Value::from(start_time),
            end_time: Value::from(end_time),
            confidence_score: Value::from(confidence),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelerResponse {
    #[serde(default)]
    exercises: Vec<RawExerciseInterval>,
}

/// Proposes exercise intervals for a video.
#[async_trait]
pub trait ExerciseLabeler: Send + Sync {
    async fn label(&self, request: &LabelerRequest) -> WorkerResult<Vec<RawExerciseInterval>>;

    fn name(&self) -> &str;
}

/// Cut the JSON payload out of a model reply.
fn extract_json_block(text: &str) -> &str {
    let fenced = if let Some((_, rest)) = text.split_once("```json") {
        Some(rest)
    } else {
        text.split_once("```").map(|(_, rest)| rest)
    };

    match fenced {
        Some(rest) => rest.split("```").next().unwrap_or(rest).trim(),
        None => text.trim(),
    }
}

static BLOCK_COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static LINE_COMMENTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)//.*$").unwrap());
static TRAILING_COMMAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").unwrap());

/// Remove trailing commas and `//` or `/* */` comments.
fn repair_json(text: &str) -> String {
    let text = BLOCK_COMMENTS.replace_all(text, "");
    let text = LINE_COMMENTS.replace_all(&text, "");
    TRAILING_COMMAS.replace_all(&text, "$1").into_owned()
}

/// Parse a labeler reply into raw exercise records.
pub fn parse_labeler_response(text: &str) -> WorkerResult<Vec<RawExerciseInterval>> {
    let json = extract_json_block(text);
    if !(json.starts_with('{') && json.ends_with('}')) {
        return Err(WorkerError::labeler_failed(
            "Labeler response does not contain a JSON object",
        ));
    }

    let response: LabelerResponse = match serde_json::from_str(json) {
        Ok(response) => response,
        Err(first) => {
            debug!(error = %first, "Labeler JSON invalid, attempting repair");
            let repaired = repair_json(json);
            serde_json::from_str(&repaired).map_err(|e| {
                WorkerError::labeler_failed(format!("Failed to parse labeler JSON: {}", e))
            })?
        }
    };

    Ok(response.exercises)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Convert raw records, dropping each invalid one with a warning.
pub fn validate_intervals(raw: Vec<RawExerciseInterval>) -> Vec<ExerciseInterval> {
    let total = raw.len();
    let valid: Vec<ExerciseInterval> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, record)| {
            let name = record.exercise_name.clone().unwrap_or_default();
            let (Some(start), Some(end)) = (number(&record.start_time), number(&record.end_time))
            else {
                warn!(
                    index = idx,
                    exercise = %name,
                    start = %record.start_time,
                    end = %record.end_time,
                    "Dropping exercise with non-numeric times"
                );
                return None;
            };
            let confidence = number(&record.confidence_score).unwrap_or(0.0);

            ExerciseInterval::new(name.clone(), start, end, confidence)
                .map_err(|e| {
                    warn!(index = idx, exercise = %name, error = %e, "Dropping invalid exercise");
                })
                .ok()
        })
        .collect();

    if valid.len() < total {
        info!(total, valid = valid.len(), "Validated labeler intervals");
    }
    valid
}

/// Exercise keywords recognised in transcripts, in priority order.
pub const EXERCISE_KEYWORDS: &[&str] = &[
    "push-up",
    "squat",
    "plank",
    "lunge",
    "burpee",
    "jumping jack",
    "mountain climber",
    "sit-up",
    "crunch",
    "bridge",
    "downward dog",
    "warrior",
    "tree pose",
    "sun salutation",
];

/// Confidence assigned to keyword matches.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

fn display_name(keyword: &str) -> String {
    keyword
        .replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Labels transcript segments that mention a known exercise.
#[derive(Debug, Clone, Default)]
pub struct KeywordFallbackLabeler;

impl KeywordFallbackLabeler {
    pub fn new() -> Self {
        Self
    }

    pub fn label_transcript(&self, transcript: &[TranscriptSegment]) -> Vec<RawExerciseInterval> {
        transcript
            .iter()
            .filter_map(|segment| {
                let text = segment.text.to_lowercase();
                EXERCISE_KEYWORDS
                    .iter()
                    .find(|keyword| text.contains(*keyword))
                    .map(|keyword| {
                        RawExerciseInterval::new(
                            &display_name(keyword),
                            segment.start,
                            segment.end,
                            FALLBACK_CONFIDENCE,
                        )
                    })
            })
            .collect()
    }
}

#[async_trait]
impl ExerciseLabeler for KeywordFallbackLabeler {
    async fn label(&self, request: &LabelerRequest) -> WorkerResult<Vec<RawExerciseInterval>> {
        let labeled = self.label_transcript(&request.transcript);
        info!(
            segments = request.transcript.len(),
            exercises = labeled.len(),
            "Keyword fallback labeling"
        );
        Ok(labeled)
    }

    fn name(&self) -> &str {
        "keyword_fallback"
    }
}

/// Replays a labeler reply stored on disk.
#[derive(Debug, Clone)]
pub struct JsonFileLabeler {
    path: PathBuf,
}

impl JsonFileLabeler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ExerciseLabeler for JsonFileLabeler {
    async fn label(&self, _request: &LabelerRequest) -> WorkerResult<Vec<RawExerciseInterval>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            WorkerError::labeler_failed(format!(
                "Failed to read labeler response {}: {}",
                self.path.display(),
                e
            ))
        })?;
        parse_labeler_response(&text)
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitclip_media::ArtifactRef;
    use image::DynamicImage;
    use std::sync::Arc;

    fn keyframe(segment_id: u32, timestamp_ms: u64) -> Keyframe {
        Keyframe {
            segment_id,
            frame_index: timestamp_ms / 40,
            timestamp_ms,
            change_score: 0.0,
            special: true,
            artifact: ArtifactRef::Memory(Arc::new(DynamicImage::new_luma8(1, 1))),
        }
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "Here you go:\n```json\n{\"exercises\": [{\"exercise_name\": \"Squat\", \"start_time\": 1.5, \"end_time\": 20, \"confidence_score\": 0.9}]}\n```\nDone.";
        let raw = parse_labeler_response(reply).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].exercise_name.as_deref(), Some("Squat"));
    }

    #[test]
    fn test_parse_plain_fence_and_bare_object() {
        let fenced = "```\n{\"exercises\": []}\n```";
        assert!(parse_labeler_response(fenced).unwrap().is_empty());
        assert!(parse_labeler_response("  {\"exercises\": []} ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_repairs_comments_and_trailing_commas() {
        let reply = r#"{
            "exercises": [
                // warm-up
                {"exercise_name": "Plank", "start_time": "3", "end_time": "30", /* model */ "confidence_score": 0.7,},
            ],
        }"#;
        let raw = parse_labeler_response(reply).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].start_time, Value::from("3"));
    }

    #[test]
    fn test_repair_json_strips_comments_and_commas() {
        assert_eq!(repair_json("{\"a\": [1, 2,], /* x */}"), "{\"a\": [1, 2]}");
        assert_eq!(repair_json("{\"a\": 1 // note\n}"), "{\"a\": 1 \n}");
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_labeler_response("I could not find any exercises.").is_err());
        assert!(parse_labeler_response("[1, 2]").is_err());
    }

    #[test]
    fn test_validate_drops_bad_records() {
        let raw = vec![
            RawExerciseInterval::new("Squat", 0.0, 10.0, 0.9),
            RawExerciseInterval {
                exercise_name: Some("Lunge".to_string()),
                start_time: Value::from("12.5"),
                end_time: Value::from(" 20 "),
                confidence_score: Value::Null,
            },
            RawExerciseInterval {
                exercise_name: Some("Burpee".to_string()),
                start_time: Value::from("soon"),
                end_time: Value::from(30.0),
                confidence_score: Value::from(0.5),
            },
            RawExerciseInterval::new("Crunch", -2.0, 4.0, 0.5),
            RawExerciseInterval {
                exercise_name: None,
                ..RawExerciseInterval::new("", 1.0, 2.0, 0.5)
            },
        ];

        let valid = validate_intervals(raw);
        let names: Vec<&str> = valid.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Squat", "Lunge"]);
        assert_eq!(valid[1].start_time, 12.5);
        assert_eq!(valid[1].end_time, 20.0);
        assert_eq!(valid[1].confidence, 0.0);
    }

    #[test]
    fn test_keyword_fallback() {
        let transcript = vec![
            TranscriptSegment::new(0.0, 4.0, "Welcome back everyone"),
            TranscriptSegment::new(4.0, 20.0, "Now drop into a PUSH-UP, then a squat"),
            TranscriptSegment::new(20.0, 45.0, "Hold that mountain climber pace"),
        ];
        let raw = KeywordFallbackLabeler::new().label_transcript(&transcript);

        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].exercise_name.as_deref(), Some("Push Up"));
        assert_eq!(raw[1].exercise_name.as_deref(), Some("Mountain Climber"));
        assert_eq!(number(&raw[1].start_time), Some(20.0));
        assert_eq!(number(&raw[0].confidence_score), Some(FALLBACK_CONFIDENCE));
    }

    #[test]
    fn test_request_frame_explanations() {
        let request = LabelerRequest::build(&[keyframe(1, 0), keyframe(2, 12_500)], 30.0, &[]);
        assert_eq!(
            request.frame_explanations,
            vec!["1. Cut 1, Time 0.000s", "2. Cut 2, Time 12.500s"]
        );
        assert!(request.transcript_text().is_none());
    }

    #[test]
    fn test_request_transcript_only_when_meaningful() {
        let covering = vec![
            TranscriptSegment::new(0.0, 10.0, "Squats first"),
            TranscriptSegment::new(10.0, 29.0, "Now planks"),
        ];
        let request = LabelerRequest::build(&[keyframe(1, 0)], 30.0, &covering);
        let text = request.transcript_text().unwrap();
        assert_eq!(text, "[0.0s - 10.0s] Squats first\n[10.0s - 29.0s] Now planks");
        assert!(request.prompt().contains("TRANSCRIPT:"));

        let short = vec![TranscriptSegment::new(0.0, 5.0, "Intro music")];
        let request = LabelerRequest::build(&[keyframe(1, 0)], 30.0, &short);
        assert!(request.transcript_text().is_none());
        assert!(!request.prompt().contains("TRANSCRIPT:"));
        // Still available to the keyword fallback
        assert_eq!(request.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_labeler() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("reply.json");
        tokio::fs::write(
            &path,
            r#"{"exercises": [{"exercise_name": "Bridge", "start_time": 5, "end_time": 25, "confidence_score": 0.8}]}"#,
        )
        .await
        .unwrap();

        let request = LabelerRequest::build(&[keyframe(1, 0)], 30.0, &[]);
        let raw = JsonFileLabeler::new(&path).label(&request).await.unwrap();
        assert_eq!(raw.len(), 1);

        let missing = JsonFileLabeler::new(dir.path().join("missing.json"))
            .label(&request)
            .await;
        assert!(matches!(missing, Err(WorkerError::LabelerFailed(_))));
    }
}
