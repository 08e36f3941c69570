//! Per-request engine protocol.
//!
//! Engine output is reduced to three events: the engine became ready, it
//! reported progress with a score, or it finished with a best move. A
//! [`SearchCollector`] consumes the events of one search and produces the
//! [`EvaluationResult`] once the terminal event arrives.

use uci::EngineMessage;

use crate::evaluation::EvaluationResult;
use crate::score::RawScore;

/// What the analysis layer cares about in engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Answer to `isready`.
    Ready,
    /// Intermediate search result carrying a score.
    Progress(RawScore),
    /// Search finished. `None` when the side to move has no legal move.
    Done { bestmove: Option<String> },
}

impl EngineEvent {
    /// Reduce a parsed engine message to an event, if it is one.
    ///
    /// Every `info` line with a score is progress, bounded or not.
    pub fn from_message(message: EngineMessage) -> Option<Self> {
        match message {
            EngineMessage::ReadyOk => Some(EngineEvent::Ready),
            EngineMessage::Info(info) => info
                .score
                .map(|score| EngineEvent::Progress(RawScore::from(score))),
            EngineMessage::BestMove { mv, .. } => Some(EngineEvent::Done { bestmove: mv }),
            EngineMessage::Id { .. } | EngineMessage::UciOk | EngineMessage::Other(_) => None,
        }
    }

    pub fn from_line(line: &str) -> Option<Self> {
        Self::from_message(EngineMessage::parse(line))
    }
}

/// Collects the events of a single search.
///
/// Scores refine with every iteration, so the most recent one wins,
/// whatever its value.
#[derive(Debug, Default)]
pub struct SearchCollector {
    last_score: Option<RawScore>,
    progress_count: usize,
}

impl SearchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event; returns the result when the search is done.
    pub fn feed(&mut self, event: EngineEvent) -> Option<EvaluationResult> {
        match event {
            EngineEvent::Progress(score) => {
                self.last_score = Some(score);
                self.progress_count += 1;
                None
            }
            EngineEvent::Done { bestmove } => Some(EvaluationResult::from_raw(
                self.last_score.take(),
                bestmove.unwrap_or_default(),
            )),
            EngineEvent::Ready => None,
        }
    }

    /// Number of progress events seen so far.
    pub fn progress_count(&self) -> usize {
        self.progress_count
    }
}
