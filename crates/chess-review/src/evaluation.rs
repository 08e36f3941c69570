//! Per-position evaluation records and the ply-keyed history cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::score::RawScore;

/// Comment stored on the placeholder result of a ply whose evaluation failed
/// during a batch sweep.
pub const FAILED_COMMENT: &str = "analysis failed";

/// Evaluation of a single position.
///
/// `score` is already normalized: pawn units, forced mates pinned to
/// [`MATE_SCORE`](crate::score::MATE_SCORE) with the sign of the mating side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Normalized score in pawns.
    #[serde(deserialize_with = "deserialize_score")]
    pub score: f64,
    /// Suggested best move in from/to square notation, empty if none.
    pub bestmove: String,
    /// The last score the engine reported, before normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawScore>,
    /// Explanatory note, set on failed plies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl EvaluationResult {
    /// Build a result from the last reported engine score.
    ///
    /// A search that never reported a score evaluates to `0.0`.
    pub fn from_raw(raw: Option<RawScore>, bestmove: impl Into<String>) -> Self {
        let score = raw.as_ref().map(RawScore::normalize).unwrap_or(0.0);
        Self {
            score,
            bestmove: bestmove.into(),
            raw,
            comment: None,
        }
    }

    /// Placeholder recorded for a ply the engine failed to evaluate.
    pub fn failed() -> Self {
        Self {
            score: 0.0,
            bestmove: String::new(),
            raw: None,
            comment: Some(FAILED_COMMENT.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.comment.as_deref() == Some(FAILED_COMMENT)
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Some(raw @ RawScore::Mate(_)) => write!(f, "{}", raw),
            _ => write!(f, "{:+.2}", self.score),
        }
    }
}

/// Accepts both a plain number and the `"#N"` text form, so histories saved
/// with raw mate strings in the score slot still load.
fn deserialize_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(RawScore::deserialize(deserializer)?.normalize())
}

/// Evaluations keyed by ply, iterated in ascending ply order.
///
/// Serializes as a plain `ply -> {score, bestmove}` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationHistory {
    entries: BTreeMap<u32, EvaluationResult>,
}

impl EvaluationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ply: u32) -> Option<&EvaluationResult> {
        self.entries.get(&ply)
    }

    pub fn contains(&self, ply: u32) -> bool {
        self.entries.contains_key(&ply)
    }

    /// Store the evaluation for `ply`, returning the one it replaced.
    pub fn insert(&mut self, ply: u32, result: EvaluationResult) -> Option<EvaluationResult> {
        self.entries.insert(ply, result)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &EvaluationResult)> + '_ {
        self.entries.iter().map(|(ply, result)| (*ply, result))
    }

    /// Normalized scores in ascending ply order.
    pub fn scores(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.entries.iter().map(|(ply, result)| (*ply, result.score))
    }

    /// History of bare pawn scores with no best moves, as used when
    /// classifying externally supplied evaluations.
    pub fn from_scores<I: IntoIterator<Item = (u32, f64)>>(scores: I) -> Self {
        scores
            .into_iter()
            .map(|(ply, score)| (ply, EvaluationResult::from_raw(Some(score.into()), "")))
            .collect()
    }

    /// Plies whose evaluation failed.
    pub fn failed_plies(&self) -> Vec<u32> {
        self.iter()
            .filter(|(_, result)| result.is_failed())
            .map(|(ply, _)| ply)
            .collect()
    }
}

impl FromIterator<(u32, EvaluationResult)> for EvaluationHistory {
    fn from_iter<I: IntoIterator<Item = (u32, EvaluationResult)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
