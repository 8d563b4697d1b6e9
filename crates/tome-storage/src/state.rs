//! Connection State Machine
//!
//! ```text
//! Closed
//!   ↓ open
//! Opening ──────────────┐
//!   ↓ stored < requested │ stored == requested
//! UpgradeNeeded          │
//!   ↓                    │
//! Upgrading              │
//!   ↓                    ↓
//! Open ─── close ───> Closed
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Closed,
    Opening,
    UpgradeNeeded,
    Upgrading,
    Open,
}

impl ConnectionState {
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, target),
            (Closed, Opening)
                | (Opening, UpgradeNeeded)
                | (Opening, Open)
                | (UpgradeNeeded, Upgrading)
                | (Upgrading, Open)
                | (Open, Closed)
                // A failed open or upgrade falls back to closed
                | (Opening, Closed)
                | (UpgradeNeeded, Closed)
                | (Upgrading, Closed)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Opening => "opening",
            ConnectionState::UpgradeNeeded => "upgrade_needed",
            ConnectionState::Upgrading => "upgrading",
            ConnectionState::Open => "open",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
