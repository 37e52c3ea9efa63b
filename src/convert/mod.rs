mod extract;
mod lanes;
mod notation;

pub use extract::{DEFAULT_MICROSECONDS_PER_BEAT, Extraction, NoteInterval, extract};
pub use lanes::{AllocationMode, Lane, MIN_REST_MS, Symbol, allocate, ticks_to_ms};
pub use notation::{LaneSummary, REST, format, format_lane, format_symbol};

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::midi_file::RawEvent;

/// Lanes derived from one source track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub source_track: usize,
    pub name: String,
    pub lanes: Vec<LaneSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub mode: AllocationMode,
    pub ms_per_tick: f64,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    NoNotesFound,
    Converted(Score),
}

impl ConversionOutcome {
    pub fn score(&self) -> Option<&Score> {
        match self {
            ConversionOutcome::NoNotesFound => None,
            ConversionOutcome::Converted(score) => Some(score),
        }
    }
}

pub fn convert<'a>(events: impl IntoIterator<Item = &'a RawEvent>, mode: AllocationMode) -> ConversionOutcome {
    let extraction = extract(events);
    convert_extraction(extraction, mode)
}

pub fn convert_extraction(extraction: Extraction, mode: AllocationMode) -> ConversionOutcome {
    if extraction.is_empty() {
        return ConversionOutcome::NoNotesFound;
    }
    let ms_per_tick = extraction.ms_per_tick();

    let parts = extraction
        .notes
        .into_iter()
        .filter(|(_, notes)| !notes.is_empty())
        .map(|(source_track, mut notes)| {
            notes.sort_by_key(|n| n.start_tick);
            let lanes = allocate(&notes, ms_per_tick, mode);
            debug!(source_track, notes = notes.len(), lanes = lanes.len(), ?mode, "allocated lanes");
            Part {
                source_track,
                name: format!("Instrument {source_track}"),
                lanes: format(&lanes, ms_per_tick),
            }
        })
        .collect();

    ConversionOutcome::Converted(Score {
        mode,
        ms_per_tick,
        parts,
    })
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            writeln!(f, "[{}]", part.name)?;
            for lane in &part.lanes {
                writeln!(
                    f,
                    "{} ({} notes, {:.2}s):",
                    lane.track_name,
                    lane.note_count,
                    lane.duration_ms as f64 / 1000.0
                )?;
                writeln!(f, "{}", lane.notation)?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConversionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionOutcome::NoNotesFound => writeln!(f, "no notes found"),
            ConversionOutcome::Converted(score) => write!(f, "{score}"),
        }
    }
}
