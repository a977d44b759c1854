use std::fmt;
use std::str::FromStr;

use crate::error::PersistenceError;

/// How much of a lobby is written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PersistenceMode {
    /// Nothing is stored.
    #[default]
    None,
    /// The full document is written after every mutation.
    Basic,
    /// An append-only event log. Accepted, but writes are refused.
    Events,
}

impl PersistenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Basic => "BASIC",
            Self::Events => "EVENTS",
        }
    }

    /// Whether this mode touches the store at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersistenceMode {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "NONE" => Ok(Self::None),
            "BASIC" => Ok(Self::Basic),
            "EVENTS" => Ok(Self::Events),
            _ => Err(PersistenceError::UnknownMode(s.to_string())),
        }
    }
}
