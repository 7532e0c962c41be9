//! Identity newtypes shared across the stack.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The integer identity of an authenticated player.
///
/// `Serial(0)` is the anonymous/not-yet-authenticated serial: a session can
/// exist (and dispatch packets) before its caller has logged in. The shared
/// cache stores this value as a decimal string under the caller's
/// auth-token, which is why `Display` renders the bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Serial(pub u32);

impl Serial {
    /// The logged-out/anonymous serial.
    pub const ANONYMOUS: Serial = Serial(0);

    /// Returns `true` for the anonymous serial.
    pub fn is_anonymous(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a game table.
///
/// Same newtype pattern as [`Serial`]: you can't accidentally pass a
/// `GameId` where a `TableId` is expected even though both are `u64`
/// underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T-{}", self.0)
    }
}

/// A unique identifier for a game tracked by an explain projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}
