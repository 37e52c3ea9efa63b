use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::midi_file::{DEFAULT_TICKS_PER_BEAT, EventKind, RawEvent};

pub const DEFAULT_MICROSECONDS_PER_BEAT: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteInterval {
    pub track: usize,
    pub pitch: u8,
    pub start_tick: u64,
    pub end_tick: u64,
}

impl NoteInterval {
    pub fn ticks(&self) -> u64 {
        self.end_tick - self.start_tick
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Per-track intervals in closing order, not sorted by start.
    pub notes: BTreeMap<usize, Vec<NoteInterval>>,
    pub ticks_per_beat: u32,
    pub microseconds_per_beat: u32,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.notes.values().all(Vec::is_empty)
    }

    pub fn ms_per_tick(&self) -> f64 {
        let ticks_per_beat = match self.ticks_per_beat {
            0 => DEFAULT_TICKS_PER_BEAT,
            t => t,
        };
        (self.microseconds_per_beat as f64 / 1000.0) / ticks_per_beat as f64
    }
}

/// Pairs note-ons with their note-offs. Only the first header and the first
/// tempo are honored; later tempo changes are ignored.
///
/// Unmatched note-offs and notes still open at the end of the stream are
/// dropped, as are intervals that would not have positive length.
pub fn extract<'a>(events: impl IntoIterator<Item = &'a RawEvent>) -> Extraction {
    let mut ticks_per_beat = None;
    let mut microseconds_per_beat = None;
    let mut open: HashMap<(usize, u8, u8), u64> = HashMap::new();
    let mut notes: BTreeMap<usize, Vec<NoteInterval>> = BTreeMap::new();

    for event in events {
        match event.kind {
            EventKind::Header { ticks_per_beat: t } => {
                ticks_per_beat.get_or_insert(t);
            }
            EventKind::Tempo {
                microseconds_per_beat: t,
            } => {
                microseconds_per_beat.get_or_insert(t);
            }
            EventKind::NoteOn {
                channel,
                pitch,
                velocity,
            } if velocity > 0 => {
                open.insert((event.track, channel, pitch), event.tick);
            }
            EventKind::NoteOn { channel, pitch, .. } | EventKind::NoteOff { channel, pitch, .. } => {
                let Some(start_tick) = open.remove(&(event.track, channel, pitch)) else {
                    continue;
                };
                if event.tick > start_tick {
                    notes.entry(event.track).or_default().push(NoteInterval {
                        track: event.track,
                        pitch,
                        start_tick,
                        end_tick: event.tick,
                    });
                }
            }
        }
    }

    if !open.is_empty() {
        debug!(unterminated = open.len(), "dropping notes left open at end of stream");
    }

    Extraction {
        notes,
        ticks_per_beat: ticks_per_beat.unwrap_or(DEFAULT_TICKS_PER_BEAT),
        microseconds_per_beat: microseconds_per_beat.unwrap_or(DEFAULT_MICROSECONDS_PER_BEAT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn on(track: usize, tick: u64, pitch: u8) -> RawEvent {
        RawEvent::new(track, tick, EventKind::NoteOn { channel: 0, pitch, velocity: 100 })
    }

    fn off(track: usize, tick: u64, pitch: u8) -> RawEvent {
        RawEvent::new(track, tick, EventKind::NoteOff { channel: 0, pitch, velocity: 0 })
    }

    #[test]
    fn defaults_without_header_or_tempo() {
        let extraction = extract(&[on(1, 0, 60), off(1, 480, 60)]);
        assert_eq!(extraction.ticks_per_beat, 480);
        assert_eq!(extraction.microseconds_per_beat, 500_000);
        assert!((extraction.ms_per_tick() - 500.0 / 480.0).abs() < 1e-12);
    }

    #[test]
    fn only_first_header_and_tempo_count() {
        let events = [
            RawEvent::new(0, 0, EventKind::Header { ticks_per_beat: 96 }),
            RawEvent::new(0, 0, EventKind::Header { ticks_per_beat: 192 }),
            RawEvent::new(1, 0, EventKind::Tempo { microseconds_per_beat: 600_000 }),
            RawEvent::new(1, 960, EventKind::Tempo { microseconds_per_beat: 300_000 }),
        ];
        let extraction = extract(&events);
        assert_eq!(extraction.ticks_per_beat, 96);
        assert_eq!(extraction.microseconds_per_beat, 600_000);
        assert!(extraction.is_empty());
    }

    #[test]
    fn zero_velocity_note_on_closes() {
        let events = [
            on(1, 10, 64),
            RawEvent::new(1, 20, EventKind::NoteOn { channel: 0, pitch: 64, velocity: 0 }),
        ];
        let extraction = extract(&events);
        assert_eq!(
            extraction.notes[&1],
            vec![NoteInterval { track: 1, pitch: 64, start_tick: 10, end_tick: 20 }]
        );
    }

    #[test]
    fn keys_are_per_track_and_channel() {
        let events = [
            on(1, 0, 60),
            RawEvent::new(1, 0, EventKind::NoteOn { channel: 1, pitch: 60, velocity: 80 }),
            on(2, 0, 60),
            off(2, 100, 60),
            RawEvent::new(1, 200, EventKind::NoteOff { channel: 1, pitch: 60, velocity: 0 }),
            off(1, 300, 60),
        ];
        let extraction = extract(&events);
        assert_eq!(extraction.notes[&2][0].end_tick, 100);
        let ends: Vec<u64> = extraction.notes[&1].iter().map(|n| n.end_tick).collect();
        assert_eq!(ends, vec![200, 300]);
    }

    #[test]
    fn retriggered_note_replaces_pending_start() {
        let extraction = extract(&[on(1, 0, 60), on(1, 100, 60), off(1, 200, 60)]);
        assert_eq!(extraction.notes[&1].len(), 1);
        assert_eq!(extraction.notes[&1][0].start_tick, 100);
    }

    #[test]
    fn malformed_streams_are_tolerated() {
        let events = [
            off(1, 0, 60),
            on(1, 50, 62),
            off(1, 50, 62),
            on(1, 60, 64),
        ];
        let extraction = extract(&events);
        assert!(extraction.is_empty());
    }

    #[test]
    fn intervals_keep_closing_order() {
        let extraction = extract(&[on(1, 0, 60), on(1, 10, 62), off(1, 20, 62), off(1, 30, 60)]);
        let pitches: Vec<u8> = extraction.notes[&1].iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![62, 60]);
    }

    proptest! {
        #[test]
        fn intervals_always_have_positive_length(
            raw in prop::collection::vec((1usize..3, 0u64..50, 0u8..4, any::<bool>(), 0u8..3), 0..200)
        ) {
            let mut tick = 0;
            let events: Vec<RawEvent> = raw
                .into_iter()
                .map(|(track, delta, pitch, is_on, velocity)| {
                    tick += delta;
                    let kind = if is_on {
                        EventKind::NoteOn { channel: 0, pitch, velocity }
                    } else {
                        EventKind::NoteOff { channel: 0, pitch, velocity }
                    };
                    RawEvent::new(track, tick, kind)
                })
                .collect();

            let extraction = extract(&events);
            for notes in extraction.notes.values() {
                for note in notes {
                    prop_assert!(note.end_tick > note.start_tick);
                }
            }
        }
    }
}
