//! UCI (Universal Chess Interface) protocol library, GUI side.
//!
//! This crate provides the types needed to drive a UCI engine from the
//! outside: formatting the commands a GUI sends and parsing the lines an
//! engine writes back.
//!
//! # Commands sent to the engine
//!
//! - `uci` - Initialize engine, get id and options
//! - `setoption name <id> value <x>` - Configure an engine option
//! - `isready` / `readyok` - Synchronization
//! - `position fen <fen>` - Set position
//! - `go depth <d>` - Start a fixed-depth search
//! - `stop` - Stop search
//! - `quit` - Exit engine
//!
//! # Messages read from the engine
//!
//! - `id name <name>` / `id author <author>`
//! - `uciok`, `readyok`
//! - `info ...` - Search progress, see [`EngineInfo`]
//! - `bestmove <move> [ponder <move>]`

mod command;
mod info;

pub use command::GuiCommand;
pub use info::{EngineInfo, InfoBuilder, Score, ScoreBound};

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id { name: Option<String>, author: Option<String> },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. `mv` is `None` when the engine reports `(none)`,
    /// i.e. the side to move has no legal moves.
    BestMove { mv: Option<String>, ponder: Option<String> },
    /// Anything else the engine prints (option declarations, banners, ...).
    Other(String),
}

impl EngineMessage {
    /// Parse one line of engine output.
    ///
    /// Never fails: lines that are not understood come back as
    /// [`EngineMessage::Other`] so a reader can skip them.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next().unwrap_or("") {
            "uciok" => EngineMessage::UciOk,
            "readyok" => EngineMessage::ReadyOk,
            "id" => match parts.next() {
                Some("name") => EngineMessage::Id {
                    name: Some(parts.collect::<Vec<_>>().join(" ")),
                    author: None,
                },
                Some("author") => EngineMessage::Id {
                    name: None,
                    author: Some(parts.collect::<Vec<_>>().join(" ")),
                },
                _ => EngineMessage::Other(line.to_string()),
            },
            "info" => match EngineInfo::parse(line) {
                Some(info) => EngineMessage::Info(info),
                None => EngineMessage::Other(line.to_string()),
            },
            "bestmove" => {
                let mv = parts
                    .next()
                    .filter(|m| *m != "(none)" && *m != "0000")
                    .map(str::to_string);
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(str::to_string),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            _ => EngineMessage::Other(line.to_string()),
        }
    }

    /// Format message as the engine would print it.
    pub fn to_uci(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EngineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // A combined id prints as two lines
            EngineMessage::Id { name, author } => {
                let lines: Vec<String> = name
                    .iter()
                    .map(|name| format!("id name {}", name))
                    .chain(author.iter().map(|author| format!("id author {}", author)))
                    .collect();
                f.write_str(&lines.join("\n"))
            }
            EngineMessage::UciOk => f.write_str("uciok"),
            EngineMessage::ReadyOk => f.write_str("readyok"),
            EngineMessage::Info(info) => fmt::Display::fmt(info, f),
            EngineMessage::BestMove { mv, ponder } => {
                write!(f, "bestmove {}", mv.as_deref().unwrap_or("(none)"))?;
                if let Some(ponder) = ponder {
                    write!(f, " ponder {}", ponder)?;
                }
                Ok(())
            }
            EngineMessage::Other(line) => f.write_str(line),
        }
    }
}
