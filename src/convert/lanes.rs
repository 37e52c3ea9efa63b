//! Splits a track's notes into lanes that never overlap.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::extract::NoteInterval;

/// Rests at or below this many milliseconds are folded into the preceding
/// symbol instead of being written out.
pub const MIN_REST_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationMode {
    /// First-fit packing: every note keeps its full length.
    #[default]
    Polyphonic,
    /// One melody lane plus chord lanes, notes clipped at the next onset.
    Monophonic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Rest { duration_ms: u64 },
    Note { pitch: u8, duration_ms: u64 },
}

impl Symbol {
    pub fn is_note(&self) -> bool {
        matches!(self, Symbol::Note { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lane {
    pub symbols: Vec<Symbol>,
    pub end_tick: u64,
}

impl Lane {
    fn rest_until(&mut self, tick: u64, ms_per_tick: f64) {
        if tick <= self.end_tick {
            return;
        }
        let duration_ms = ticks_to_ms(tick - self.end_tick, ms_per_tick);
        if duration_ms > MIN_REST_MS {
            self.symbols.push(Symbol::Rest { duration_ms });
        }
    }

    fn push_note(&mut self, pitch: u8, start_tick: u64, end_tick: u64, ms_per_tick: f64) {
        if end_tick > start_tick {
            self.symbols.push(Symbol::Note {
                pitch,
                duration_ms: ticks_to_ms(end_tick - start_tick, ms_per_tick),
            });
        }
        self.end_tick = end_tick;
    }
}

pub fn ticks_to_ms(ticks: u64, ms_per_tick: f64) -> u64 {
    (ticks as f64 * ms_per_tick).round() as u64
}

/// `notes` must already be sorted by `start_tick`. Lanes that end up
/// without any symbol are dropped.
pub fn allocate(notes: &[NoteInterval], ms_per_tick: f64, mode: AllocationMode) -> Vec<Lane> {
    let mut lanes = match mode {
        AllocationMode::Polyphonic => polyphonic(notes, ms_per_tick),
        AllocationMode::Monophonic => monophonic(notes, ms_per_tick),
    };
    lanes.retain(|lane| !lane.symbols.is_empty());
    lanes
}

fn polyphonic(notes: &[NoteInterval], ms_per_tick: f64) -> Vec<Lane> {
    let mut lanes: Vec<Lane> = Vec::new();

    for note in notes {
        let index = match lanes.iter().position(|l| l.end_tick <= note.start_tick) {
            Some(index) => index,
            None => {
                lanes.push(Lane::default());
                lanes.len() - 1
            }
        };
        let lane = &mut lanes[index];
        lane.rest_until(note.start_tick, ms_per_tick);
        lane.push_note(note.pitch, note.start_tick, note.end_tick, ms_per_tick);
    }

    lanes
}

fn monophonic(notes: &[NoteInterval], ms_per_tick: f64) -> Vec<Lane> {
    let mut clusters: BTreeMap<u64, Vec<&NoteInterval>> = BTreeMap::new();
    for note in notes {
        clusters.entry(note.start_tick).or_default().push(note);
    }

    let starts: Vec<u64> = clusters.keys().copied().collect();
    let mut main = Lane::default();
    let mut chords: Vec<Lane> = Vec::new();

    for (i, cluster) in clusters.values().enumerate() {
        let next_start = starts.get(i + 1).copied();

        for (j, note) in cluster.iter().enumerate() {
            let lane = match j {
                0 => &mut main,
                j => {
                    if chords.len() < j {
                        chords.push(Lane::default());
                    }
                    &mut chords[j - 1]
                }
            };

            let end_tick = match next_start {
                Some(next) => note.end_tick.min(next),
                None => note.end_tick,
            };
            lane.rest_until(note.start_tick, ms_per_tick);
            lane.push_note(note.pitch, note.start_tick, end_tick, ms_per_tick);
        }
    }

    std::iter::once(main).chain(chords).collect()
}
