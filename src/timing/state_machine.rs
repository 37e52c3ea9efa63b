use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
    /// Reached the end on its own. Behaves like `Idle` for every control.
    Ended,
}

impl TransportState {
    pub fn is_active(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Paused)
    }

    pub fn status(self) -> PlaybackStatus {
        PlaybackStatus {
            is_playing: self.is_active(),
            is_paused: self == TransportState::Paused,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportState::Idle => "idle",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
            TransportState::Ended => "ended",
        })
    }
}

/// What `get_state` reports to a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub is_paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_still_counts_as_playing() {
        assert_eq!(
            TransportState::Paused.status(),
            PlaybackStatus { is_playing: true, is_paused: true }
        );
        assert_eq!(TransportState::Ended.status(), PlaybackStatus::default());
        assert_eq!(TransportState::Idle.status(), PlaybackStatus::default());
    }
}
