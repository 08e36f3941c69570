#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess_review::{ChannelConfig, ChannelError, EngineChannel, EvaluationResult, Evaluator, Position};
use tokio::sync::mpsc;
use uci::{EngineMessage, GuiCommand};

// ---------------------------------------------------------------------------
// Scripted UCI engine
// ---------------------------------------------------------------------------

/// How the fake engine answers a `go`.
pub enum Reply {
    /// Print these lines.
    Lines(Vec<String>),
    /// Exit without answering.
    Crash,
    /// Say nothing until stopped.
    Silent,
}

pub fn lines(lines: &[&str]) -> Reply {
    Reply::Lines(lines.iter().map(|line| line.to_string()).collect())
}

pub struct FakeEngine {
    pub name: &'static str,
    /// Answer `stop` with a `bestmove`.
    pub answer_stop: bool,
    /// Called with the FEN of the last `position` command on every `go`.
    pub script: Box<dyn FnMut(&str) -> Reply + Send>,
}

impl FakeEngine {
    pub fn new(script: impl FnMut(&str) -> Reply + Send + 'static) -> Self {
        Self {
            name: "FakeFish 1.0",
            answer_stop: true,
            script: Box::new(script),
        }
    }
}

/// Run `engine` as an in-memory task and connect a channel to it. Returns the
/// channel and every command line the engine received.
pub fn connect(engine: FakeEngine, config: ChannelConfig) -> (EngineChannel, Arc<Mutex<Vec<String>>>) {
    let (command_tx, mut command_rx) = mpsc::channel::<String>(64);
    let (output_tx, output_rx) = mpsc::channel::<String>(64);
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    let FakeEngine {
        name,
        answer_stop,
        mut script,
    } = engine;

    tokio::spawn(async move {
        let mut fen = String::new();
        while let Some(command) = command_rx.recv().await {
            log.lock().unwrap().push(command.clone());

            let replies = match GuiCommand::parse(&command) {
                Ok(GuiCommand::Uci) => vec![
                    EngineMessage::Id {
                        name: Some(name.to_string()),
                        author: None,
                    },
                    EngineMessage::Id {
                        name: None,
                        author: Some("Tests".to_string()),
                    },
                    EngineMessage::UciOk,
                ],
                Ok(GuiCommand::IsReady) => vec![EngineMessage::ReadyOk],
                Ok(GuiCommand::Position { fen: position }) => {
                    fen = position;
                    Vec::new()
                }
                Ok(GuiCommand::Go { .. }) => match script(&fen) {
                    Reply::Lines(lines) => lines.iter().map(|line| EngineMessage::parse(line)).collect(),
                    Reply::Crash => return,
                    Reply::Silent => Vec::new(),
                },
                Ok(GuiCommand::Stop) if answer_stop => vec![EngineMessage::BestMove {
                    mv: None,
                    ponder: None,
                }],
                Ok(GuiCommand::Quit) => return,
                _ => Vec::new(),
            };

            for message in replies {
                if output_tx.send(message.to_uci()).await.is_err() {
                    return;
                }
            }
        }
    });

    (
        EngineChannel::from_lines(command_tx, output_rx, config),
        received,
    )
}

// ---------------------------------------------------------------------------
// Counting evaluator
// ---------------------------------------------------------------------------

/// Shared view on what a [`CountingEvaluator`] was asked to do.
#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<AtomicUsize>,
    pub overlapped: Arc<AtomicBool>,
    pub fens: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn fens(&self) -> Vec<String> {
        self.fens.lock().unwrap().clone()
    }
}

/// Evaluator that records its calls and flags overlapping requests.
pub struct CountingEvaluator {
    pub scores: HashMap<String, f64>,
    pub fail_on: Vec<String>,
    pub busy: bool,
    pub delay: Duration,
    in_flight: Arc<AtomicBool>,
    probe: Probe,
}

impl CountingEvaluator {
    pub fn new() -> (Self, Probe) {
        let probe = Probe::default();
        let evaluator = Self {
            scores: HashMap::new(),
            fail_on: Vec::new(),
            busy: false,
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicBool::new(false)),
            probe: probe.clone(),
        };
        (evaluator, probe)
    }

    pub fn with_scores(mut self, scores: &[f64]) -> Self {
        self.scores = scores
            .iter()
            .enumerate()
            .map(|(ply, score)| (fen(ply as u32), *score))
            .collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, ply: u32) -> Self {
        self.fail_on.push(fen(ply));
        self
    }
}

impl Evaluator for CountingEvaluator {
    async fn evaluate(&mut self, fen: &str, _depth: u32) -> Result<EvaluationResult, ChannelError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.probe.overlapped.store(true, Ordering::SeqCst);
        }
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.probe.fens.lock().unwrap().push(fen.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.store(false, Ordering::SeqCst);

        if self.busy {
            return Err(ChannelError::Busy);
        }
        if self.fail_on.iter().any(|failing| failing == fen) {
            return Err(ChannelError::EvaluationFailed("engine crashed".to_string()));
        }
        let score = self.scores.get(fen).copied().unwrap_or(0.0);
        Ok(EvaluationResult::from_raw(Some(score.into()), "e2e4"))
    }
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

pub fn fen(ply: u32) -> String {
    format!("fen-{}", ply)
}

/// A game of `len` positions with synthetic FENs.
pub fn game(len: u32) -> Vec<Position> {
    (0..len)
        .map(|ply| Position::new(ply, fen(ply), if ply == 0 { "" } else { "Nf3" }))
        .collect()
}
