//! One-shot identification of a short recording.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use tunemark_core::catalog::Catalog;
use tunemark_core::{Error, MatchCandidate, Result};

use crate::fingerprint::{analyze_blocking, Fingerprinter};
use crate::hash::HashTable;
use crate::types::AudioData;

/// How candidates returned by the catalog are filtered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyPolicy {
    /// Reject when the top score is below this; `None` accepts anything
    pub min_score: Option<f64>,
    /// Candidates returned on a match
    pub max_candidates: usize,
}

impl Default for IdentifyPolicy {
    fn default() -> Self {
        Self {
            min_score: Some(20.0),
            max_candidates: 3,
        }
    }
}

impl IdentifyPolicy {
    /// Return the top candidates whatever their score
    pub fn unconditional(max_candidates: usize) -> Self {
        Self {
            min_score: None,
            max_candidates,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_candidates == 0 {
            return Err(Error::InvalidConfig("max_candidates must be positive".into()));
        }
        if self.min_score.is_some_and(|s| !s.is_finite()) {
            return Err(Error::InvalidConfig("min_score must be finite".into()));
        }
        Ok(())
    }

    /// Classify a ranked candidate list.
    pub fn apply(&self, mut candidates: Vec<MatchCandidate>) -> IdentifyOutcome {
        let Some(best) = candidates.first() else {
            return IdentifyOutcome::NoMatch;
        };

        if let Some(min_score) = self.min_score {
            if best.score < min_score {
                return IdentifyOutcome::LowConfidence { best: best.clone() };
            }
        }

        candidates.truncate(self.max_candidates);
        IdentifyOutcome::Matched { candidates }
    }
}

/// Result of identifying a recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IdentifyOutcome {
    /// The recording produced no hashes
    NoFingerprints,
    /// The catalog returned no candidates
    NoMatch,
    /// The best candidate scored under the policy minimum
    LowConfidence { best: MatchCandidate },
    /// Best first
    Matched { candidates: Vec<MatchCandidate> },
}

impl IdentifyOutcome {
    pub fn best(&self) -> Option<&MatchCandidate> {
        match self {
            IdentifyOutcome::Matched { candidates } => candidates.first(),
            _ => None,
        }
    }
}

/// Query the catalog with an already computed table.
#[instrument(skip(catalog, table, policy), fields(hashes = table.len()))]
pub async fn identify_table(
    catalog: &dyn Catalog,
    table: &HashTable,
    policy: &IdentifyPolicy,
) -> Result<IdentifyOutcome> {
    policy.validate()?;

    let rows = table.query_rows();
    if rows.is_empty() {
        info!("No fingerprints in recording");
        return Ok(IdentifyOutcome::NoFingerprints);
    }

    let candidates = catalog.match_hashes(&rows).await?;
    let outcome = policy.apply(candidates);

    match &outcome {
        IdentifyOutcome::Matched { candidates } => {
            if let Some(best) = candidates.first() {
                info!(song_id = %best.song_id, score = best.score, "Recording identified");
            }
        }
        IdentifyOutcome::LowConfidence { best } => {
            info!(song_id = %best.song_id, score = best.score, "Low confidence match");
        }
        _ => info!("No match"),
    }

    Ok(outcome)
}

/// Fingerprint a recording and identify it.
pub async fn identify_clip(
    catalog: &dyn Catalog,
    fingerprinter: Arc<Fingerprinter>,
    audio: AudioData,
    policy: &IdentifyPolicy,
) -> Result<IdentifyOutcome> {
    let analysis = analyze_blocking(fingerprinter, audio).await?;
    identify_table(catalog, &analysis.table, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunemark_core::SongId;

    fn candidate(id: i64, score: f64) -> MatchCandidate {
        MatchCandidate {
            song_id: SongId(id),
            title: format!("song {}", id),
            channel: None,
            score,
            time_diff: 0,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = IdentifyPolicy::default();
        assert_eq!(policy.min_score, Some(20.0));
        assert_eq!(policy.max_candidates, 3);
    }

    #[test]
    fn test_empty_candidates_is_no_match() {
        assert_eq!(IdentifyPolicy::default().apply(Vec::new()), IdentifyOutcome::NoMatch);
    }

    #[test]
    fn test_low_score_rejected() {
        let outcome = IdentifyPolicy::default().apply(vec![candidate(1, 19.0), candidate(2, 5.0)]);
        assert_eq!(
            outcome,
            IdentifyOutcome::LowConfidence {
                best: candidate(1, 19.0)
            }
        );
        assert!(outcome.best().is_none());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let outcome = IdentifyPolicy::default().apply(vec![candidate(1, 20.0)]);
        assert_eq!(outcome.best(), Some(&candidate(1, 20.0)));
    }

    #[test]
    fn test_unconditional_returns_top_three() {
        let candidates = (1..=5).map(|i| candidate(i, 10.0 - i as f64)).collect();
        let outcome = IdentifyPolicy::unconditional(3).apply(candidates);
        match outcome {
            IdentifyOutcome::Matched { candidates: top } => {
                let ids: Vec<i64> = top.iter().map(|c| c.song_id.0).collect();
                assert_eq!(ids, vec![1, 2, 3]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_policy_validation() {
        assert!(IdentifyPolicy::unconditional(0).validate().is_err());
        let policy: IdentifyPolicy = serde_json::from_str(r#"{"min_score": null}"#).unwrap();
        assert_eq!(policy.min_score, None);
        assert_eq!(policy.max_candidates, 3);
    }
}
