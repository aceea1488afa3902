//! Negotiated connectivity descriptor reported by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Substring identifying a final-result record on engine stdout.
pub const RESULT_MARKER: &str = "5-tuple";

/// Transport protocol of a negotiated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// UDP path.
    Udp,
    /// TCP path.
    Tcp,
}

impl Protocol {
    /// Wire string for this protocol.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(AppError::Decode(format!("unknown protocol: {other}"))),
        }
    }
}

/// Protocol plus local and remote endpoints of a traversed path.
///
/// Decoding ignores fields other than `proto`, `local` and `remote`, so the
/// marker key the engine writes alongside them is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiveTuple {
    /// Transport protocol.
    pub proto: Protocol,
    /// Local endpoint, `host:port`.
    pub local: String,
    /// Remote endpoint, `host:port`.
    pub remote: String,
}

impl FiveTuple {
    /// Whether a raw engine record carries a final result.
    #[must_use]
    pub fn is_result_record(record: &[u8]) -> bool {
        let marker = RESULT_MARKER.as_bytes();
        record.windows(marker.len()).any(|w| w == marker)
    }

    /// Decode a final-result record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Decode` when the record is not a JSON object with
    /// valid `proto`, `local` and `remote` fields.
    pub fn from_record(record: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(record)?)
    }
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.proto, self.local, self.remote)
    }
}
