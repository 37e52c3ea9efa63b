use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::{Envelope, Waveform};
use crate::error::{Error, Result};

/// Player tuning, read from a RON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub tick_interval_ms: u64,
    pub lookahead_ms: u64,
    /// Capacity of the queue between the engine thread and the audio callback.
    pub event_queue_capacity: usize,
    pub envelope: Envelope,
    pub default_waveform: Waveform,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 25,
            lookahead_ms: 100,
            event_queue_capacity: 4096,
            envelope: Envelope::default(),
            default_waveform: Waveform::Triangle,
        }
    }
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let ron_string = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: PlayerConfig = ron::from_str(&ron_string)?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }
}
