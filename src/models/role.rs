//! Negotiation role of a session.

use std::fmt;

/// Which side of the negotiation the engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Initiates the negotiation by making an offer.
    Offerer,
    /// Waits for and accepts an offer.
    Answerer,
}

impl Role {
    /// Engine command-line flag selecting this role, if any.
    ///
    /// The engine runs as answerer when no mode flag is given.
    #[must_use]
    pub fn mode_flag(self) -> Option<&'static str> {
        match self {
            Self::Offerer => Some("-offer"),
            Self::Answerer => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offerer => "offerer",
            Self::Answerer => "answerer",
        })
    }
}
