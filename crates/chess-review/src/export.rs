//! Saved analyses and exported reports.
//!
//! Three artifacts are produced from an analyzed game:
//!
//! - a [`SavedAnalysis`] record that can be loaded back with
//!   [`AnalysisOrchestrator::restore`](crate::AnalysisOrchestrator::restore);
//! - a per-ply JSON report, see [`ply_report`];
//! - a plain text report, see [`text_report`].
//!
//! The saved record looks like:
//!
//! ```json
//! {
//!   "originalMoveText": "1. e4 e5 2. Qh5 Nc6",
//!   "evaluationHistory": {
//!     "0": { "score": 0.3, "bestmove": "e2e4" },
//!     "1": { "score": 0.25, "bestmove": "e7e5" }
//!   },
//!   "flaggedPlies": [6],
//!   "searchDepth": 10,
//!   "timestamp": 1718000000000
//! }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzer::DEFAULT_DEPTH;
use crate::evaluation::{EvaluationHistory, EvaluationResult};
use crate::position::Position;
use crate::quality::Classification;

/// Errors that can occur when saving or loading analyses.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_depth() -> u32 {
    DEFAULT_DEPTH
}

/// A game's analysis as saved between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnalysis {
    /// The move text the positions were parsed from.
    pub original_move_text: String,
    pub evaluation_history: EvaluationHistory,
    /// Blunder plies at the time of saving.
    #[serde(default)]
    pub flagged_plies: Vec<u32>,
    #[serde(default = "default_depth")]
    pub search_depth: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SavedAnalysis {
    /// Build a record stamped with the current time.
    pub fn new(
        original_move_text: impl Into<String>,
        evaluation_history: EvaluationHistory,
        flagged_plies: Vec<u32>,
        search_depth: u32,
    ) -> Self {
        Self {
            original_move_text: original_move_text.into(),
            evaluation_history,
            flagged_plies,
            search_depth,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// One entry of the per-ply JSON report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlyReport {
    pub ply: u32,
    pub fen: String,
    /// Move in SAN, `"start"` for the initial position.
    pub san: String,
    pub analysis: Option<EvaluationResult>,
    pub comment: Option<String>,
}

/// Comment for a ply: a failed evaluation explains itself, otherwise the
/// classifier's verdict.
fn ply_comment(
    history: &EvaluationHistory,
    classification: &Classification,
    ply: u32,
) -> Option<String> {
    history
        .get(ply)
        .and_then(|result| result.comment.clone())
        .or_else(|| classification.comment(ply).map(str::to_string))
}

/// Per-ply report covering every position, analyzed or not.
pub fn ply_report(
    positions: &[Position],
    history: &EvaluationHistory,
    classification: &Classification,
) -> Vec<PlyReport> {
    positions
        .iter()
        .map(|position| PlyReport {
            ply: position.ply,
            fen: position.fen.clone(),
            san: if position.ply == 0 {
                "start".to_string()
            } else {
                position.san.clone()
            },
            analysis: history.get(position.ply).cloned(),
            comment: ply_comment(history, classification, position.ply),
        })
        .collect()
}

/// Write the per-ply report as pretty JSON.
pub fn write_ply_report<P: AsRef<Path>>(
    path: P,
    positions: &[Position],
    history: &EvaluationHistory,
    classification: &Classification,
) -> Result<(), ExportError> {
    let report = ply_report(positions, history, classification);
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

/// Text report with one line per analyzed ply:
///
/// ```text
/// Start        | Eval: +0.20  | Best: e2e4 | Comment:
/// 1. e4        | Eval: +0.25  | Best: e7e5 | Comment: Neutral
/// 2. Qh5       | Eval: #3     | Best: h5f7 | Comment: Good move
/// ```
pub fn text_report(
    positions: &[Position],
    history: &EvaluationHistory,
    classification: &Classification,
) -> String {
    positions
        .iter()
        .filter_map(|position| {
            let result = history.get(position.ply)?;
            let comment = ply_comment(history, classification, position.ply).unwrap_or_default();
            Some(format!(
                "{:<12} | Eval: {:<6} | Best: {} | Comment: {}",
                position.move_label(),
                result.to_string(),
                result.bestmove,
                comment
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
