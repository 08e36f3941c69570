//! UCI commands sent from GUI to engine.

use std::fmt;

use crate::UciError;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Set an engine option.
    SetOption { name: String, value: Option<String> },
    /// Check if engine is ready.
    IsReady,
    /// Set up the position to search from.
    Position { fen: String },
    /// Search to a fixed depth.
    Go { depth: u32 },
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

impl GuiCommand {
    /// Format the command as a single UCI line (without newline).
    pub fn to_uci(&self) -> String {
        self.to_string()
    }

    /// Parse a UCI command string.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut tokens = input.split_whitespace();

        match tokens.next().unwrap_or("") {
            "uci" => Ok(GuiCommand::Uci),
            "isready" => Ok(GuiCommand::IsReady),
            "stop" => Ok(GuiCommand::Stop),
            "quit" => Ok(GuiCommand::Quit),
            "setoption" => Self::parse_setoption(tokens),
            "position" => Self::parse_position(tokens),
            "go" => Self::parse_go(tokens),
            _ => Ok(GuiCommand::Unknown(input.to_string())),
        }
    }

    fn parse_setoption<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        if tokens.next() != Some("name") {
            return Err(UciError::ParseError(
                "Expected 'name' after 'setoption'".to_string(),
            ));
        }

        let mut name = Vec::new();
        let mut value: Option<Vec<&str>> = None;
        for token in tokens {
            match &mut value {
                Some(words) => words.push(token),
                None if token == "value" => value = Some(Vec::new()),
                None => name.push(token),
            }
        }
        if name.is_empty() {
            return Err(UciError::ParseError("Empty option name".to_string()));
        }

        Ok(GuiCommand::SetOption {
            name: name.join(" "),
            value: value.map(|words| words.join(" ")),
        })
    }

    fn parse_position<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        match tokens.next() {
            Some("fen") => {
                let fields: Vec<&str> = tokens.collect();
                if fields.is_empty() {
                    return Err(UciError::ParseError("Empty FEN".to_string()));
                }
                Ok(GuiCommand::Position {
                    fen: fields.join(" "),
                })
            }
            Some(other) => Err(UciError::ParseError(format!(
                "Expected 'fen', got '{}'",
                other
            ))),
            None => Err(UciError::ParseError("Expected 'fen'".to_string())),
        }
    }

    fn parse_go<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        match (tokens.next(), tokens.next().map(str::parse::<u32>)) {
            (Some("depth"), Some(Ok(depth))) => Ok(GuiCommand::Go { depth }),
            _ => Err(UciError::ParseError(
                "Expected 'go depth <n>'".to_string(),
            )),
        }
    }
}

impl fmt::Display for GuiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuiCommand::Uci => f.write_str("uci"),
            GuiCommand::SetOption { name, value } => {
                write!(f, "setoption name {}", name)?;
                if let Some(value) = value {
                    write!(f, " value {}", value)?;
                }
                Ok(())
            }
            GuiCommand::IsReady => f.write_str("isready"),
            GuiCommand::Position { fen } => write!(f, "position fen {}", fen),
            GuiCommand::Go { depth } => write!(f, "go depth {}", depth),
            GuiCommand::Stop => f.write_str("stop"),
            GuiCommand::Quit => f.write_str("quit"),
            GuiCommand::Unknown(line) => f.write_str(line),
        }
    }
}
