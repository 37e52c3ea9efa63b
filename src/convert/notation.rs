use serde::{Deserialize, Serialize};

use super::lanes::{Lane, Symbol, ticks_to_ms};
use crate::pitch::note_name;

/// Symbol written for a rest.
pub const REST: &str = "@";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSummary {
    pub track_name: String,
    pub note_count: usize,
    pub duration_ms: u64,
    pub notation: String,
}

pub fn format_symbol(symbol: &Symbol) -> String {
    match *symbol {
        Symbol::Rest { duration_ms } => format!("{REST}/{duration_ms}"),
        Symbol::Note { pitch, duration_ms } => format!("{}/{duration_ms}", note_name(pitch)),
    }
}

pub fn format_lane(lane: &Lane) -> String {
    lane.symbols
        .iter()
        .map(format_symbol)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lanes are named `Track1`, `Track2`, ... in the order given.
pub fn format(lanes: &[Lane], ms_per_tick: f64) -> Vec<LaneSummary> {
    lanes
        .iter()
        .enumerate()
        .map(|(i, lane)| LaneSummary {
            track_name: format!("Track{}", i + 1),
            note_count: lane.symbols.iter().filter(|s| s.is_note()).count(),
            duration_ms: ticks_to_ms(lane.end_tick, ms_per_tick),
            notation: format_lane(lane),
        })
        .collect()
}
