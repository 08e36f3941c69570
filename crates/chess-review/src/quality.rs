//! Move quality classification from an evaluation history.
//!
//! Each ply after the first present one is labeled by how much the
//! evaluation dropped, seen from the side that just moved. The loss between
//! two consecutive analyzed plies is
//!
//! ```text
//! loss = mover_perspective(prev_ply, prev) - mover_perspective(curr_ply, curr)
//! ```
//!
//! and is bucketed against a single threshold `T`:
//!
//! | loss              | label        |
//! |-------------------|--------------|
//! | `>= 3T`           | Blunder      |
//! | `[T, 3T)`         | Inaccuracy   |
//! | `[0.5T, T)`       | Dubious      |
//! | `<= -0.5T`        | Good move    |
//! | otherwise         | Neutral      |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluation::EvaluationHistory;

/// Classification of a move based on evaluation loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveLabel {
    /// Loss of at least three thresholds
    Blunder,
    /// Loss of one to three thresholds
    Inaccuracy,
    /// Loss of half to one threshold
    Dubious,
    /// Gain of at least half a threshold
    Good,
    /// Anything in between
    Neutral,
}

impl MoveLabel {
    /// Comment text shown next to the move.
    pub fn comment(self) -> &'static str {
        match self {
            MoveLabel::Blunder => "Blunder!",
            MoveLabel::Inaccuracy => "Inaccuracy",
            MoveLabel::Dubious => "Dubious move",
            MoveLabel::Good => "Good move",
            MoveLabel::Neutral => "Neutral",
        }
    }

    /// Bucket an evaluation loss.
    pub fn from_loss(loss: f64, thresholds: Thresholds) -> Self {
        let t = thresholds.unit;
        if loss >= 3.0 * t {
            MoveLabel::Blunder
        } else if loss >= t {
            MoveLabel::Inaccuracy
        } else if loss >= 0.5 * t {
            MoveLabel::Dubious
        } else if loss <= -0.5 * t {
            MoveLabel::Good
        } else {
            MoveLabel::Neutral
        }
    }

    /// Whether the move lands in one of the flagged lists.
    pub fn is_flagged(self) -> bool {
        matches!(
            self,
            MoveLabel::Blunder | MoveLabel::Inaccuracy | MoveLabel::Dubious
        )
    }
}

impl fmt::Display for MoveLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.comment())
    }
}

/// Cut points for [`MoveLabel::from_loss`], all derived from one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// The inaccuracy threshold `T`, in pawns.
    pub unit: f64,
}

impl Thresholds {
    pub fn new(unit: f64) -> Self {
        Self { unit }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { unit: 1.0 }
    }
}

/// Turn a normalized score into the perspective of the player who made the
/// move leading to `ply`: odd plies keep their sign, even plies are negated.
pub fn mover_perspective(ply: u32, eval: f64) -> f64 {
    if ply % 2 == 0 {
        -eval
    } else {
        eval
    }
}

/// Result of classifying a whole history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Blunder plies, ascending.
    pub blunders: Vec<u32>,
    /// Inaccuracy plies, ascending.
    pub inaccuracies: Vec<u32>,
    /// Dubious plies, ascending.
    pub dubious: Vec<u32>,
    /// Label of every classified ply.
    pub labels: BTreeMap<u32, MoveLabel>,
}

impl Classification {
    pub fn label(&self, ply: u32) -> Option<MoveLabel> {
        self.labels.get(&ply).copied()
    }

    /// Comment text for `ply`, if it was classified.
    pub fn comment(&self, ply: u32) -> Option<&'static str> {
        self.label(ply).map(MoveLabel::comment)
    }

    /// Ply to comment mapping, as exported.
    pub fn comments(&self) -> BTreeMap<u32, &'static str> {
        self.labels
            .iter()
            .map(|(ply, label)| (*ply, label.comment()))
            .collect()
    }

    /// Summary figures for a game of `total_moves` half-moves.
    pub fn stats(&self, total_moves: u32) -> GameStats {
        let flagged = (self.blunders.len() + self.inaccuracies.len() + self.dubious.len()) as u32;
        let accuracy_percent = if total_moves > 0 {
            f64::from(total_moves.saturating_sub(flagged)) / f64::from(total_moves) * 100.0
        } else {
            0.0
        };
        GameStats {
            total_moves,
            blunders: self.blunders.len() as u32,
            inaccuracies: self.inaccuracies.len() as u32,
            dubious: self.dubious.len() as u32,
            accuracy_percent,
        }
    }
}

/// Summary statistics for a classified game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    /// Half-moves in the game (positions minus one)
    pub total_moves: u32,
    /// Number of blunders
    pub blunders: u32,
    /// Number of inaccuracies
    pub inaccuracies: u32,
    /// Number of dubious moves
    pub dubious: u32,
    /// Share of unflagged moves (0-100)
    pub accuracy_percent: f64,
}

/// Classify every analyzed ply after the first.
///
/// Only plies present in `history` take part; a missing ply is skipped, so
/// each present ply is compared with the closest present ply before it.
pub fn classify(history: &EvaluationHistory, thresholds: Thresholds) -> Classification {
    let mut outcome = Classification::default();
    let mut previous: Option<(u32, f64)> = None;

    for (ply, eval) in history.scores() {
        if let Some((prev_ply, prev_eval)) = previous {
            let loss = mover_perspective(prev_ply, prev_eval) - mover_perspective(ply, eval);
            let label = MoveLabel::from_loss(loss, thresholds);
            match label {
                MoveLabel::Blunder => outcome.blunders.push(ply),
                MoveLabel::Inaccuracy => outcome.inaccuracies.push(ply),
                MoveLabel::Dubious => outcome.dubious.push(ply),
                MoveLabel::Good | MoveLabel::Neutral => {}
            }
            outcome.labels.insert(ply, label);
        }
        previous = Some((ply, eval));
    }

    outcome
}
