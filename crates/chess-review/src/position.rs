//! Game positions as delivered by the move-list parser.

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisError;

/// One position of a game.
///
/// Ply 0 is the starting position and has an empty `san`; ply `n` is the
/// position after the `n`-th half-move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Half-move index, 0 for the starting position.
    pub ply: u32,
    /// Board state in FEN notation.
    pub fen: String,
    /// The move that produced this position, in SAN.
    #[serde(default)]
    pub san: String,
}

impl Position {
    pub fn new(ply: u32, fen: impl Into<String>, san: impl Into<String>) -> Self {
        Self {
            ply,
            fen: fen.into(),
            san: san.into(),
        }
    }

    /// Move label used in reports: `Start` for ply 0, otherwise the move
    /// number followed by the SAN (`3. Nf6`).
    pub fn move_label(&self) -> String {
        if self.ply == 0 {
            "Start".to_string()
        } else {
            format!("{}. {}", self.ply.div_ceil(2), self.san)
        }
    }

    /// Check that `positions` is a complete game: non-empty, starting at
    /// ply 0, plies consecutive.
    pub fn validate_sequence(positions: &[Position]) -> Result<(), AnalysisError> {
        if positions.is_empty() {
            return Err(AnalysisError::InvalidGame("no positions".to_string()));
        }
        for (index, position) in positions.iter().enumerate() {
            if position.ply as usize != index {
                return Err(AnalysisError::InvalidGame(format!(
                    "expected ply {} at index {}, found ply {}",
                    index, index, position.ply
                )));
            }
            if position.fen.trim().is_empty() {
                return Err(AnalysisError::InvalidGame(format!(
                    "empty FEN at ply {}",
                    position.ply
                )));
            }
        }
        Ok(())
    }
}
