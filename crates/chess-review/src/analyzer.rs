//! Analysis orchestration over a loaded game.
//!
//! The [`AnalysisOrchestrator`] owns the evaluation history of the current
//! game and is the only place it is mutated. Two paths fill it:
//!
//! - the lazy path, [`AnalysisOrchestrator::ensure_analyzed`], evaluates a
//!   single ply on demand and merges it into the history;
//! - the sweep, [`AnalysisOrchestrator::run_batch`], evaluates every ply in
//!   order and replaces the history wholesale once it finishes.
//!
//! Engine access is serialized through an async mutex around the
//! [`Evaluator`]; the rest of the state sits behind a plain mutex that is
//! never held across an await point, so one orchestrator can be shared
//! between a sweep task and on-demand callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::engine::{ChannelError, Evaluator};
use crate::evaluation::{EvaluationHistory, EvaluationResult};
use crate::export::SavedAnalysis;
use crate::position::Position;
use crate::quality::{classify, Classification, GameStats, Thresholds};

/// Search depth used when none is configured.
pub const DEFAULT_DEPTH: u32 = 10;

/// Errors that can occur during game analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Error from the engine channel.
    #[error("Engine error: {0}")]
    Channel(#[from] ChannelError),
    /// Invalid game data was provided.
    #[error("Invalid game data: {0}")]
    InvalidGame(String),
    /// A ply outside the loaded game was requested.
    #[error("Ply {ply} is out of range for a game of {len} positions")]
    PlyOutOfRange { ply: u32, len: usize },
    /// Search depth must be positive.
    #[error("Search depth must be at least 1")]
    InvalidDepth,
    /// The operation cannot run while a sweep is active.
    #[error("A batch analysis is running")]
    BatchRunning,
}

/// Configuration for game analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    /// Search depth for every engine request.
    pub depth: u32,
    /// Classification thresholds.
    pub thresholds: Thresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            thresholds: Thresholds::default(),
        }
    }
}

/// What [`AnalysisOrchestrator::ensure_analyzed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The ply was already in the history.
    Cached,
    /// The ply was evaluated and stored.
    Analyzed,
    /// A sweep is active; the sweep will cover the ply.
    Deferred,
    /// The game was replaced while the request was in flight; the result was
    /// dropped.
    Discarded,
}

/// How a sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every ply was evaluated and the history replaced. `failed` plies hold
    /// the failure placeholder.
    Completed { analyzed: usize, failed: usize },
    /// The sweep was cancelled before evaluating `at_ply`; the history is
    /// unchanged.
    Cancelled { at_ply: u32 },
    /// Another sweep was already active; nothing happened.
    AlreadyRunning,
    /// A new game was loaded mid-sweep; partial results were dropped.
    Superseded,
}

/// Progress of the active sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// Ply currently being evaluated.
    pub current_ply: u32,
    /// Number of positions in the sweep.
    pub total: u32,
}

struct BatchRun {
    id: u64,
    cancel: Arc<AtomicBool>,
    current_ply: u32,
    total: u32,
}

#[derive(Default)]
struct State {
    positions: Vec<Position>,
    history: EvaluationHistory,
    classification: Classification,
    batch: Option<BatchRun>,
    generation: u64,
    next_batch_id: u64,
    current_ply: u32,
    depth: u32,
}

impl State {
    fn position(&self, ply: u32) -> Result<&Position, AnalysisError> {
        self.positions
            .get(ply as usize)
            .ok_or(AnalysisError::PlyOutOfRange {
                ply,
                len: self.positions.len(),
            })
    }

    fn reclassify(&mut self, thresholds: Thresholds) {
        self.classification = classify(&self.history, thresholds);
    }

    /// Drop the sweep `id` if it is still the active one.
    fn finish_batch(&mut self, id: u64) {
        if self.batch.as_ref().is_some_and(|batch| batch.id == id) {
            self.batch = None;
        }
    }

    /// Check sweep `id` for cancellation or a replaced game before it
    /// evaluates `ply`, and record `ply` as its progress otherwise.
    fn interruption(
        &mut self,
        id: u64,
        generation: u64,
        cancel: &AtomicBool,
        ply: u32,
    ) -> Option<BatchOutcome> {
        if self.generation != generation {
            info!(batch = id, "batch superseded by a new game");
            return Some(BatchOutcome::Superseded);
        }
        if cancel.load(Ordering::SeqCst) {
            self.finish_batch(id);
            info!(batch = id, at_ply = ply, "batch cancelled");
            return Some(BatchOutcome::Cancelled { at_ply: ply });
        }
        if let Some(batch) = self.batch.as_mut().filter(|batch| batch.id == id) {
            batch.current_ply = ply;
        }
        None
    }
}

/// Clears the sweep's slot when `run_batch` ends, including when its future
/// is dropped mid-sweep.
struct BatchGuard<'a> {
    state: &'a Mutex<State>,
    id: u64,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish_batch(self.id);
    }
}

/// Drives an [`Evaluator`] over a game and keeps its classified history.
pub struct AnalysisOrchestrator<E> {
    evaluator: tokio::sync::Mutex<E>,
    state: Mutex<State>,
    thresholds: Thresholds,
}

impl<E: Evaluator> AnalysisOrchestrator<E> {
    /// Create an orchestrator with no game loaded.
    ///
    /// The evaluator should already be initialized.
    pub fn new(evaluator: E, config: AnalysisConfig) -> Self {
        let depth = if config.depth == 0 {
            DEFAULT_DEPTH
        } else {
            config.depth
        };
        Self {
            evaluator: tokio::sync::Mutex::new(evaluator),
            state: Mutex::new(State {
                depth,
                ..State::default()
            }),
            thresholds: config.thresholds,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the game.
    ///
    /// Clears the history, cancels and forgets any active sweep and resets
    /// the navigation pointer. Requests still in flight for the previous
    /// game are discarded when they resolve. On error nothing changes.
    pub fn load_game(&self, positions: Vec<Position>) -> Result<(), AnalysisError> {
        Position::validate_sequence(&positions)?;

        let mut state = self.lock_state();
        if let Some(batch) = state.batch.take() {
            batch.cancel.store(true, Ordering::SeqCst);
            info!(batch = batch.id, "new game loaded, dropping active batch");
        }
        state.positions = positions;
        state.history.clear();
        state.classification = Classification::default();
        state.generation += 1;
        state.current_ply = 0;
        info!(
            positions = state.positions.len(),
            generation = state.generation,
            "game loaded"
        );
        Ok(())
    }

    /// Make sure `ply` has an evaluation, asking the engine at most once.
    ///
    /// Engine failures are returned and nothing is stored, so the call can
    /// be retried.
    pub async fn ensure_analyzed(&self, ply: u32) -> Result<EnsureOutcome, AnalysisError> {
        let (fen, depth, generation) = {
            let state = self.lock_state();
            let position = state.position(ply)?;
            if state.history.contains(ply) {
                return Ok(EnsureOutcome::Cached);
            }
            if state.batch.is_some() {
                return Ok(EnsureOutcome::Deferred);
            }
            (position.fen.clone(), state.depth, state.generation)
        };

        let mut evaluator = self.evaluator.lock().await;

        // Whoever held the engine before us may have changed things
        {
            let state = self.lock_state();
            if state.generation != generation {
                return Ok(EnsureOutcome::Discarded);
            }
            if state.history.contains(ply) {
                return Ok(EnsureOutcome::Cached);
            }
            if state.batch.is_some() {
                return Ok(EnsureOutcome::Deferred);
            }
        }

        let result = match evaluator.evaluate(&fen, depth).await {
            Ok(result) => result,
            Err(ChannelError::Busy) => {
                error!(ply, "engine busy although access is serialized");
                return Err(ChannelError::EvaluationFailed("engine busy".to_string()).into());
            }
            Err(e) => {
                warn!(ply, error = %e, "on-demand analysis failed");
                return Err(e.into());
            }
        };

        // Stored while the engine is still held, so a concurrent caller for
        // the same ply finds it cached.
        let mut state = self.lock_state();
        if state.generation != generation {
            return Ok(EnsureOutcome::Discarded);
        }
        info!(ply, score = result.score, bestmove = %result.bestmove, "ply analyzed");
        state.history.insert(ply, result);
        state.reclassify(self.thresholds);
        drop(state);
        drop(evaluator);
        Ok(EnsureOutcome::Analyzed)
    }

    /// [`ensure_analyzed`](Self::ensure_analyzed) for the navigation pointer.
    pub async fn ensure_current(&self) -> Result<EnsureOutcome, AnalysisError> {
        let ply = self.current_ply();
        self.ensure_analyzed(ply).await
    }

    /// Evaluate every position in ply order and replace the history.
    ///
    /// A ply the engine fails on gets [`EvaluationResult::failed`] and the
    /// sweep goes on. Cancellation is honored between positions; a
    /// cancelled or superseded sweep leaves the history untouched. Dropping
    /// the future ends the sweep the same way.
    pub async fn run_batch(&self) -> Result<BatchOutcome, AnalysisError> {
        let (id, cancel, positions, depth, generation) = {
            let mut state = self.lock_state();
            if state.batch.is_some() {
                return Ok(BatchOutcome::AlreadyRunning);
            }
            if state.positions.is_empty() {
                return Err(AnalysisError::InvalidGame("no game loaded".to_string()));
            }
            let id = state.next_batch_id;
            state.next_batch_id += 1;
            let cancel = Arc::new(AtomicBool::new(false));
            state.batch = Some(BatchRun {
                id,
                cancel: Arc::clone(&cancel),
                current_ply: 0,
                total: state.positions.len() as u32,
            });
            (id, cancel, state.positions.clone(), state.depth, state.generation)
        };

        let _guard = BatchGuard {
            state: &self.state,
            id,
        };
        info!(batch = id, positions = positions.len(), depth, "batch analysis started");

        let mut partial = EvaluationHistory::new();
        let mut failed = 0;

        for position in &positions {
            let interruption = self
                .lock_state()
                .interruption(id, generation, &cancel, position.ply);
            if let Some(outcome) = interruption {
                return Ok(outcome);
            }

            let result = {
                let mut evaluator = self.evaluator.lock().await;
                evaluator.evaluate(&position.fen, depth).await
            };
            let result = match result {
                Ok(result) => {
                    info!(
                        batch = id,
                        ply = position.ply,
                        total = positions.len(),
                        score = result.score,
                        "ply analyzed"
                    );
                    result
                }
                Err(e) => {
                    warn!(batch = id, ply = position.ply, error = %e, "ply analysis failed");
                    failed += 1;
                    EvaluationResult::failed()
                }
            };
            partial.insert(position.ply, result);
        }

        // Checked under the same lock as the commit, so a game loaded or a
        // cancel requested after the last evaluation still wins.
        let at_end = positions.len() as u32;
        let mut state = self.lock_state();
        if let Some(outcome) = state.interruption(id, generation, &cancel, at_end) {
            return Ok(outcome);
        }
        state.history = partial;
        state.reclassify(self.thresholds);
        state.finish_batch(id);
        info!(
            batch = id,
            analyzed = positions.len(),
            failed,
            blunders = state.classification.blunders.len(),
            "batch analysis finished"
        );
        drop(state);
        Ok(BatchOutcome::Completed {
            analyzed: positions.len(),
            failed,
        })
    }

    /// Ask the active sweep to stop. Returns whether one was active.
    pub fn cancel_batch(&self) -> bool {
        let state = self.lock_state();
        match &state.batch {
            Some(batch) => {
                batch.cancel.store(true, Ordering::SeqCst);
                info!(batch = batch.id, "batch cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().batch.is_some()
    }

    /// Progress of the active sweep, if any.
    pub fn batch_progress(&self) -> Option<BatchProgress> {
        self.lock_state().batch.as_ref().map(|batch| BatchProgress {
            current_ply: batch.current_ply,
            total: batch.total,
        })
    }

    /// Change the search depth for subsequent requests. A running sweep
    /// keeps the depth it started with.
    pub fn set_depth(&self, depth: u32) -> Result<(), AnalysisError> {
        if depth == 0 {
            return Err(AnalysisError::InvalidDepth);
        }
        self.lock_state().depth = depth;
        Ok(())
    }

    pub fn depth(&self) -> u32 {
        self.lock_state().depth
    }

    pub fn current_ply(&self) -> u32 {
        self.lock_state().current_ply
    }

    /// Move the navigation pointer.
    pub fn set_current_ply(&self, ply: u32) -> Result<(), AnalysisError> {
        let mut state = self.lock_state();
        state.position(ply)?;
        state.current_ply = ply;
        Ok(())
    }

    /// Snapshot of the evaluation history.
    pub fn history(&self) -> EvaluationHistory {
        self.lock_state().history.clone()
    }

    /// Snapshot of the current classification.
    pub fn classification(&self) -> Classification {
        self.lock_state().classification.clone()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.lock_state().positions.clone()
    }

    /// Summary figures for the loaded game.
    pub fn stats(&self) -> GameStats {
        let state = self.lock_state();
        let total_moves = state.positions.len().saturating_sub(1) as u32;
        state.classification.stats(total_moves)
    }

    /// Load a previously saved history for the current game, together with
    /// its search depth.
    pub fn restore(&self, saved: &SavedAnalysis) -> Result<(), AnalysisError> {
        let mut state = self.lock_state();
        if state.batch.is_some() {
            return Err(AnalysisError::BatchRunning);
        }
        if state.positions.is_empty() {
            return Err(AnalysisError::InvalidGame("no game loaded".to_string()));
        }
        let len = state.positions.len();
        if let Some((ply, _)) = saved
            .evaluation_history
            .iter()
            .find(|(ply, _)| *ply as usize >= len)
        {
            return Err(AnalysisError::PlyOutOfRange { ply, len });
        }

        state.history = saved.evaluation_history.clone();
        if saved.search_depth > 0 {
            state.depth = saved.search_depth;
        }
        state.reclassify(self.thresholds);
        info!(
            entries = state.history.len(),
            depth = state.depth,
            "analysis restored"
        );
        Ok(())
    }

    /// Snapshot the analysis as a saveable record.
    pub fn export(&self, original_move_text: impl Into<String>) -> SavedAnalysis {
        let state = self.lock_state();
        SavedAnalysis::new(
            original_move_text,
            state.history.clone(),
            state.classification.blunders.clone(),
            state.depth,
        )
    }

    /// Give back the evaluator, e.g. to shut the engine down.
    pub fn into_evaluator(self) -> E {
        self.evaluator.into_inner()
    }
}
