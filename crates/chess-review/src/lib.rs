//! Chess game review on top of a UCI analysis engine.
//!
//! This crate drives an engine such as Stockfish over every position of a
//! game, keeps the resulting evaluations and labels each move by how much
//! it lost.
//!
//! # Overview
//!
//! - [`score`] - Normalization of engine scores to pawn units
//! - [`EngineChannel`] - Single-flight session with a UCI engine process
//! - [`classify`] - Move labels (Blunder, Inaccuracy, Dubious, ...) from an
//!   evaluation history
//! - [`AnalysisOrchestrator`] - On-demand and batch analysis of a loaded game
//! - [`export`] - Saved analyses and JSON/text reports
//!
//! # Example
//!
//! ```ignore
//! use chess_review::{AnalysisConfig, AnalysisOrchestrator, ChannelConfig, EngineChannel};
//!
//! let mut engine = EngineChannel::spawn("stockfish", ChannelConfig::default())?;
//! engine.initialize().await?;
//!
//! let orchestrator = AnalysisOrchestrator::new(engine, AnalysisConfig::default());
//! orchestrator.load_game(positions)?;
//! orchestrator.run_batch().await?;
//! println!("Accuracy: {:.1}%", orchestrator.stats().accuracy_percent);
//! ```

pub mod analyzer;
pub mod engine;
pub mod evaluation;
pub mod export;
pub mod position;
pub mod protocol;
pub mod quality;
pub mod score;

pub use analyzer::{
    AnalysisConfig, AnalysisError, AnalysisOrchestrator, BatchOutcome, BatchProgress,
    EnsureOutcome,
};
pub use engine::{ChannelConfig, ChannelError, ChannelState, EngineChannel, Evaluator};
pub use evaluation::{EvaluationHistory, EvaluationResult};
pub use export::{ExportError, PlyReport, SavedAnalysis};
pub use position::Position;
pub use quality::{classify, mover_perspective, Classification, GameStats, MoveLabel, Thresholds};
pub use score::RawScore;
