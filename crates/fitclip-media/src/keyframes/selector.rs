//! Keep/drop decisions for sampled candidates.

use fitclip_models::CutMark;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::artifact::{ArtifactName, ArtifactStore};
use super::change_score::ChangeScorer;
use super::config::{KeyframeConfig, SelectionPolicy};
use super::{Candidate, Keyframe};

/// Decides which candidates survive to become keyframes.
///
/// Priority order: the video start and end frames always survive, then
/// frames sitting exactly on a cut, then the remaining candidates are kept
/// or dropped by comparing their change score with the similarity
/// threshold under the configured [`SelectionPolicy`].
pub struct KeyframeSelector<'a> {
    policy: SelectionPolicy,
    threshold: f64,
    boundary_epsilon_s: f64,
    scorer: ChangeScorer,
    store: &'a ArtifactStore,
}

impl<'a> KeyframeSelector<'a> {
    pub fn new(config: &KeyframeConfig, store: &'a ArtifactStore) -> Self {
        Self {
            policy: config.selection_policy,
            threshold: config.similarity_threshold,
            boundary_epsilon_s: config.boundary_epsilon_s,
            scorer: ChangeScorer::new(config.blur_sigma),
            store,
        }
    }

    /// Whether a candidate is exempt from scoring.
    ///
    /// The end window is open: a frame exactly `boundary_epsilon_s` before
    /// the end is scored like any other.
    pub fn is_special(
        &self,
        candidate: &Candidate,
        duration_s: f64,
        cut_ms: &HashSet<u64>,
    ) -> bool {
        let end_ms = (duration_s.max(0.0) * 1000.0).round() as u64;
        let epsilon_ms = (self.boundary_epsilon_s.max(0.0) * 1000.0).round() as u64;
        candidate.timestamp_ms == 0
            || candidate.timestamp_ms.abs_diff(end_ms) < epsilon_ms
            || cut_ms.contains(&candidate.timestamp_ms)
    }

    /// Select survivors; dropped candidates have their artifacts released.
    ///
    /// Survivors are re-tagged with their diagnostic score (0 for special
    /// frames). A failed rename keeps the original artifact.
    pub fn select(
        &self,
        candidates: Vec<Candidate>,
        cuts: &[CutMark],
        duration_s: f64,
    ) -> Vec<Keyframe> {
        let cut_ms: HashSet<u64> = cuts.iter().map(CutMark::timestamp_ms).collect();
        let special: Vec<bool> = candidates
            .iter()
            .map(|c| self.is_special(c, duration_s, &cut_ms))
            .collect();
        let wanted: Vec<bool> = special.iter().map(|s| !s).collect();
        let scores = self.scorer.score_all(&candidates, &wanted);

        let total = candidates.len();
        let mut kept = Vec::new();

        for ((candidate, is_special), score) in candidates.into_iter().zip(special).zip(scores) {
            let score = score.unwrap_or(0.0);
            let survives = is_special || self.policy.keeps(score, self.threshold);

            if !survives {
                debug!(timestamp_ms = candidate.timestamp_ms, score, "Dropping candidate");
                self.store.release(&candidate.artifact);
                continue;
            }

            let mut keyframe = Keyframe {
                segment_id: candidate.segment_id,
                frame_index: candidate.frame_index,
                timestamp_ms: candidate.timestamp_ms,
                change_score: if is_special { 0.0 } else { score },
                special: is_special,
                artifact: candidate.artifact,
            };

            let name = ArtifactName::new(
                keyframe.segment_id,
                keyframe.frame_index,
                keyframe.timestamp_ms,
            )
            .with_diff(keyframe.diff_score());
            match self.store.rename(&keyframe.artifact, &name) {
                Ok(artifact) => keyframe.artifact = artifact,
                Err(e) => warn!(error = %e, "Could not tag keyframe artifact"),
            }

            kept.push(keyframe);
        }

        info!(
            candidates = total,
            kept = kept.len(),
            policy = ?self.policy,
            threshold = self.threshold,
            "Keyframe selection complete"
        );
        kept
    }
}
