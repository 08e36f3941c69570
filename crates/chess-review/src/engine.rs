//! Engine channel: a single-flight session with an external UCI engine.
//!
//! The channel talks to the engine through two line queues. When spawned
//! from an executable, one task writes queued commands to the engine's
//! stdin and another forwards its stdout lines; tests can hand in their own
//! queues with [`EngineChannel::from_lines`].
//!
//! ```text
//! Uninitialized --initialize--> Ready --evaluate--> Busy --done--> Ready
//!                                 \                                  |
//!                                  `------------ terminate ---------`--> Terminated
//! ```

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uci::{EngineMessage, GuiCommand};

use crate::evaluation::EvaluationResult;
use crate::protocol::{EngineEvent, SearchCollector};

/// Capacity of the command and output line queues.
const LINE_QUEUE_CAPACITY: usize = 256;

/// How long to wait for `bestmove` after sending `stop` to a search that
/// ran out of time.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Errors that can occur when working with an engine channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// `evaluate` was called before `initialize` completed.
    #[error("Engine channel is not ready")]
    NotReady,
    /// `evaluate` was called while another request is in flight.
    #[error("Engine channel is busy with another request")]
    Busy,
    /// The channel was terminated or the engine went away.
    #[error("Engine channel is closed")]
    Closed,
    /// The engine crashed, timed out or answered with garbage mid-request.
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),
    /// Failed to spawn the engine process.
    #[error("Failed to spawn engine: {0}")]
    Spawn(#[from] std::io::Error),
    /// The UCI handshake did not complete.
    #[error("Engine handshake failed: {0}")]
    Handshake(String),
}

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Ready,
    Busy,
    Terminated,
}

/// Something that evaluates positions one at a time.
///
/// Implementations are single-flight: callers must not start a new
/// evaluation before the previous one resolved.
pub trait Evaluator: Send {
    /// Evaluate the position given as FEN to a fixed depth.
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u32,
    ) -> impl Future<Output = Result<EvaluationResult, ChannelError>> + Send;
}

/// Settings for a channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upper bound on a single search.
    pub search_timeout: Duration,
    /// Upper bound on the `uci`/`isready` handshake.
    pub handshake_timeout: Duration,
    /// UCI options sent during the handshake, e.g. `("Threads", "2")`.
    pub options: Vec<(String, String)>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            options: Vec::new(),
        }
    }
}

/// Session with one long-lived engine.
pub struct EngineChannel {
    commands: mpsc::Sender<String>,
    output: mpsc::Receiver<String>,
    process: Option<Child>,
    state: ChannelState,
    name: String,
    config: ChannelConfig,
}

impl EngineChannel {
    /// Spawn the engine executable and wire up its pipes.
    ///
    /// The channel starts `Uninitialized`; await [`initialize`](Self::initialize)
    /// before the first evaluation.
    pub fn spawn<P: AsRef<Path>>(path: P, config: ChannelConfig) -> Result<Self, ChannelError> {
        let mut process = Command::new(path.as_ref())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = process
            .stdin
            .take()
            .ok_or_else(|| ChannelError::Handshake("engine stdin unavailable".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| ChannelError::Handshake("engine stdout unavailable".to_string()))?;

        let (command_tx, mut command_rx) = mpsc::channel::<String>(LINE_QUEUE_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel::<String>(LINE_QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                if stdin.write_all(cmd.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                    || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if output_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let mut channel = Self::from_lines(command_tx, output_rx, config);
        channel.process = Some(process);
        Ok(channel)
    }

    /// Build a channel over existing line queues: commands go out on
    /// `commands`, engine output arrives on `output`.
    pub fn from_lines(
        commands: mpsc::Sender<String>,
        output: mpsc::Receiver<String>,
        config: ChannelConfig,
    ) -> Self {
        Self {
            commands,
            output,
            process: None,
            state: ChannelState::Uninitialized,
            name: String::new(),
            config,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Engine name reported during the handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Perform the UCI handshake and move to `Ready`.
    ///
    /// Idempotent once ready.
    pub async fn initialize(&mut self) -> Result<(), ChannelError> {
        match self.state {
            ChannelState::Ready => return Ok(()),
            ChannelState::Busy => return Err(ChannelError::Busy),
            ChannelState::Terminated => return Err(ChannelError::Closed),
            ChannelState::Uninitialized => {}
        }

        let limit = self.config.handshake_timeout;
        match timeout(limit, self.handshake()).await {
            Ok(Ok(())) => {
                self.state = ChannelState::Ready;
                info!(engine = %self.name, "engine ready");
                Ok(())
            }
            Ok(Err(e)) => Err(ChannelError::Handshake(e.to_string())),
            Err(_) => Err(ChannelError::Handshake(format!(
                "no answer within {}ms",
                limit.as_millis()
            ))),
        }
    }

    async fn handshake(&mut self) -> Result<(), ChannelError> {
        self.send(GuiCommand::Uci).await?;
        loop {
            match self.next_message().await? {
                EngineMessage::Id {
                    name: Some(name), ..
                } => self.name = name,
                EngineMessage::UciOk => break,
                _ => {}
            }
        }
        if self.name.is_empty() {
            self.name = "Unknown Engine".to_string();
        }

        let options = self.config.options.clone();
        for (name, value) in options {
            self.send(GuiCommand::SetOption {
                name,
                value: Some(value),
            })
            .await?;
        }

        self.send(GuiCommand::IsReady).await?;
        loop {
            if let Some(EngineEvent::Ready) = EngineEvent::from_message(self.next_message().await?)
            {
                return Ok(());
            }
        }
    }

    /// Evaluate one position to `depth`.
    ///
    /// Fails with [`ChannelError::NotReady`] before the handshake,
    /// [`ChannelError::Busy`] while another request is outstanding (including
    /// one whose future was dropped) and [`ChannelError::Closed`] after
    /// [`terminate`](Self::terminate).
    pub async fn evaluate(&mut self, fen: &str, depth: u32) -> Result<EvaluationResult, ChannelError> {
        match self.state {
            ChannelState::Uninitialized => return Err(ChannelError::NotReady),
            ChannelState::Busy => return Err(ChannelError::Busy),
            ChannelState::Terminated => return Err(ChannelError::Closed),
            ChannelState::Ready => {}
        }
        self.state = ChannelState::Busy;

        self.send(GuiCommand::Position {
            fen: fen.to_string(),
        })
        .await?;
        self.send(GuiCommand::Go { depth }).await?;

        let limit = self.config.search_timeout;
        match timeout(limit, self.collect_search()).await {
            Ok(Ok(result)) => {
                self.state = ChannelState::Ready;
                debug!(score = result.score, bestmove = %result.bestmove, "search done");
                Ok(result)
            }
            // collect_search already marked the channel terminated
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(fen, depth, "search timed out, stopping engine");
                self.abort_search().await;
                Err(ChannelError::EvaluationFailed(format!(
                    "search exceeded {}ms",
                    limit.as_millis()
                )))
            }
        }
    }

    async fn collect_search(&mut self) -> Result<EvaluationResult, ChannelError> {
        let mut collector = SearchCollector::new();
        loop {
            let message = self.next_message().await?;
            if let Some(event) = EngineEvent::from_message(message) {
                if let Some(result) = collector.feed(event) {
                    debug!(progress = collector.progress_count(), "search finished");
                    return Ok(result);
                }
            }
        }
    }

    /// Stop a search that ran out of time. The channel is usable again only
    /// if the engine acknowledges with `bestmove` in time.
    async fn abort_search(&mut self) {
        if self.send(GuiCommand::Stop).await.is_err() {
            return;
        }
        let drained = timeout(STOP_GRACE, async {
            loop {
                match self.next_message().await {
                    Ok(EngineMessage::BestMove { .. }) => return true,
                    Ok(_) => {}
                    Err(_) => return false,
                }
            }
        })
        .await;

        self.state = match drained {
            Ok(true) => ChannelState::Ready,
            _ => ChannelState::Terminated,
        };
    }

    /// Shut the engine down. Later evaluations fail with
    /// [`ChannelError::Closed`].
    pub async fn terminate(&mut self) {
        if self.state == ChannelState::Terminated && self.process.is_none() {
            return;
        }
        let _ = self.commands.send(GuiCommand::Quit.to_uci()).await;
        self.state = ChannelState::Terminated;

        if let Some(mut process) = self.process.take() {
            // Give it a moment to exit gracefully
            if timeout(Duration::from_millis(500), process.wait())
                .await
                .is_err()
            {
                let _ = process.kill().await;
            }
        }
        info!(engine = %self.name, "engine terminated");
    }

    async fn send(&mut self, command: GuiCommand) -> Result<(), ChannelError> {
        let line = command.to_uci();
        debug!(line = %line, "engine <");
        if self.commands.send(line).await.is_err() {
            self.state = ChannelState::Terminated;
            return Err(ChannelError::EvaluationFailed(
                "engine input closed".to_string(),
            ));
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<EngineMessage, ChannelError> {
        match self.output.recv().await {
            Some(line) => {
                debug!(line = %line, "engine >");
                Ok(EngineMessage::parse(&line))
            }
            None => {
                self.state = ChannelState::Terminated;
                Err(ChannelError::EvaluationFailed(
                    "engine output closed".to_string(),
                ))
            }
        }
    }
}

impl Evaluator for EngineChannel {
    async fn evaluate(&mut self, fen: &str, depth: u32) -> Result<EvaluationResult, ChannelError> {
        EngineChannel::evaluate(self, fen, depth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_channel() -> (EngineChannel, mpsc::Receiver<String>, mpsc::Sender<String>) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (output_tx, output_rx) = mpsc::channel(8);
        let channel = EngineChannel::from_lines(command_tx, output_rx, ChannelConfig::default());
        (channel, command_rx, output_tx)
    }

    #[tokio::test]
    async fn evaluate_before_initialize_is_not_ready() {
        let (mut channel, _commands, _output) = detached_channel();
        assert_eq!(channel.state(), ChannelState::Uninitialized);
        let err = channel.evaluate("8/8/8/8/8/8/8/K1k5 w - - 0 1", 5).await;
        assert!(matches!(err, Err(ChannelError::NotReady)));
    }

    #[tokio::test]
    async fn evaluate_after_terminate_is_closed() {
        let (mut channel, mut commands, _output) = detached_channel();
        channel.terminate().await;
        assert_eq!(channel.state(), ChannelState::Terminated);
        assert_eq!(commands.recv().await.as_deref(), Some("quit"));

        let err = channel.evaluate("8/8/8/8/8/8/8/K1k5 w - - 0 1", 5).await;
        assert!(matches!(err, Err(ChannelError::Closed)));
        assert!(matches!(channel.initialize().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn handshake_fails_when_engine_goes_away() {
        let (mut channel, commands, output) = detached_channel();
        drop(output);
        drop(commands);
        let err = channel.initialize().await.unwrap_err();
        assert!(matches!(err, ChannelError::Handshake(_)));
    }

    #[test]
    fn test_spawn_nonexistent_executable_returns_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let result = EngineChannel::spawn("/nonexistent/path/to/engine", ChannelConfig::default());
        assert!(matches!(result, Err(ChannelError::Spawn(_))));
    }

    #[test]
    fn test_channel_error_display() {
        assert_eq!(ChannelError::NotReady.to_string(), "Engine channel is not ready");
        assert_eq!(ChannelError::Closed.to_string(), "Engine channel is closed");
        let failed = ChannelError::EvaluationFailed("engine output closed".to_string());
        assert!(failed.to_string().contains("engine output closed"));
        let spawn = ChannelError::Spawn(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(spawn.to_string().contains("Failed to spawn engine"));
    }

    #[test]
    fn default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.search_timeout, Duration::from_secs(60));
        assert!(config.options.is_empty());
    }
}
