//! Engine score encoding and normalization to a single pawn scale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Value a forced mate is pinned to, in pawns.
///
/// Large enough to dominate any ordinary positional evaluation when two
/// scores are compared.
pub const MATE_SCORE: f64 = 10.0;

/// A score as reported by the engine layer.
///
/// Serialized the way saved analyses store it: a plain JSON number for
/// pawn scores and a `"#N"` / `"#-N"` string for forced mates.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    /// Ordinary evaluation in pawn units (centipawns / 100).
    Pawns(f64),
    /// Forced mate in N; positive when the side to move delivers it.
    Mate(i32),
    /// Text that could not be understood. Normalizes to `0.0`.
    Unparsed(String),
}

impl RawScore {
    /// Parse the textual encoding: `"#3"`, `"#-3"`, `"1.25"`.
    ///
    /// Never fails; anything unrecognized is kept as [`RawScore::Unparsed`].
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(n) = trimmed.strip_prefix('#') {
            return match n.parse::<i32>() {
                Ok(n) => RawScore::Mate(n),
                Err(_) => RawScore::Unparsed(text.to_string()),
            };
        }
        match trimmed.parse::<f64>() {
            Ok(p) if p.is_finite() => RawScore::Pawns(p),
            _ => RawScore::Unparsed(text.to_string()),
        }
    }

    /// Map onto the bounded comparison scale.
    pub fn normalize(&self) -> f64 {
        match self {
            RawScore::Pawns(p) => *p,
            RawScore::Mate(n) if *n > 0 => MATE_SCORE,
            RawScore::Mate(_) => -MATE_SCORE,
            RawScore::Unparsed(text) => {
                warn!(score = %text, "unparsable engine score, treating as 0.0");
                0.0
            }
        }
    }
}

/// Normalize a textual score. Total: unparsable input yields `0.0`.
pub fn normalize(raw: &str) -> f64 {
    RawScore::parse(raw).normalize()
}

impl From<uci::Score> for RawScore {
    fn from(score: uci::Score) -> Self {
        match score {
            uci::Score::Cp(cp) => RawScore::Pawns(f64::from(cp) / 100.0),
            uci::Score::Mate(n) => RawScore::Mate(n),
        }
    }
}

impl From<f64> for RawScore {
    fn from(pawns: f64) -> Self {
        if pawns.is_finite() {
            RawScore::Pawns(pawns)
        } else {
            RawScore::Unparsed(pawns.to_string())
        }
    }
}

impl FromStr for RawScore {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RawScore::parse(s))
    }
}

impl fmt::Display for RawScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawScore::Pawns(p) => write!(f, "{:+.2}", p),
            RawScore::Mate(n) => write!(f, "#{}", n),
            RawScore::Unparsed(text) => f.write_str(text),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireScore {
    Number(f64),
    Text(String),
}

impl Serialize for RawScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            RawScore::Pawns(p) => WireScore::Number(*p),
            RawScore::Mate(n) => WireScore::Text(format!("#{}", n)),
            RawScore::Unparsed(text) => WireScore::Text(text.clone()),
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawScore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireScore::deserialize(deserializer)? {
            WireScore::Number(p) => RawScore::from(p),
            WireScore::Text(text) => RawScore::parse(&text),
        })
    }
}
