//! Standard MIDI File decoding.
//!
//! The byte-level work is done by `midly`; this module only flattens each
//! track into [`RawEvent`]s with absolute tick positions, keeping the
//! handful of event kinds the converter cares about.

use std::path::Path;

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use crate::error::{Error, Result};

/// Ticks per beat assumed when a file does not use metrical timing.
pub const DEFAULT_TICKS_PER_BEAT: u32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Header { ticks_per_beat: u32 },
    Tempo { microseconds_per_beat: u32 },
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// 1-based track number; the header record uses track 0.
    pub track: usize,
    pub tick: u64,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(track: usize, tick: u64, kind: EventKind) -> Self {
        Self { track, tick, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub format: u16,
    pub track_count: usize,
    pub ticks_per_beat: u32,
}

#[derive(Debug, Clone)]
pub struct EventStream {
    pub header: StreamHeader,
    pub events: Vec<RawEvent>,
}

pub fn read(path: &Path) -> Result<EventStream> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    decode(&bytes)
}

pub fn decode(bytes: &[u8]) -> Result<EventStream> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u32,
        Timing::Timecode(..) => DEFAULT_TICKS_PER_BEAT,
    };
    let header = StreamHeader {
        format: match smf.header.format {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        },
        track_count: smf.tracks.len(),
        ticks_per_beat,
    };

    let mut events = vec![RawEvent::new(0, 0, EventKind::Header { ticks_per_beat })];

    for (index, track) in smf.tracks.iter().enumerate() {
        let track_number = index + 1;
        let mut tick: u64 = 0;

        for event in track {
            tick += event.delta.as_int() as u64;

            let kind = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                            channel,
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                            channel,
                            pitch: key.as_int(),
                            velocity: vel.as_int(),
                        },
                        _ => continue,
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => EventKind::Tempo {
                    microseconds_per_beat: tempo.as_int(),
                },
                _ => continue,
            };

            events.push(RawEvent::new(track_number, tick, kind));
        }
    }

    debug!(
        tracks = header.track_count,
        ticks_per_beat,
        events = events.len(),
        "decoded MIDI file"
    );

    Ok(EventStream { header, events })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(mut value: u32, out: &mut Vec<u8>) {
        let mut bytes = vec![(value & 0x7f) as u8];
        value >>= 7;
        while value > 0 {
            bytes.push((value & 0x7f) as u8 | 0x80);
            value >>= 7;
        }
        bytes.reverse();
        out.extend(bytes);
    }

    fn smf(ticks_per_beat: u16, tracks: &[Vec<(u32, Vec<u8>)>]) -> Vec<u8> {
        let mut out = b"MThd".to_vec();
        out.extend(6u32.to_be_bytes());
        out.extend(1u16.to_be_bytes());
        out.extend((tracks.len() as u16).to_be_bytes());
        out.extend(ticks_per_beat.to_be_bytes());

        for track in tracks {
            let mut body = Vec::new();
            for (delta, data) in track {
                vlq(*delta, &mut body);
                body.extend(data);
            }
            body.extend([0x00, 0xff, 0x2f, 0x00]);
            out.extend(b"MTrk");
            out.extend((body.len() as u32).to_be_bytes());
            out.extend(body);
        }
        out
    }

    #[test]
    fn decodes_notes_with_absolute_ticks() {
        let bytes = smf(
            96,
            &[
                vec![(0, vec![0xff, 0x51, 0x03, 0x07, 0xa1, 0x20])],
                vec![
                    (0, vec![0x90, 60, 100]),
                    (96, vec![0x80, 60, 0]),
                    (48, vec![0x91, 62, 90]),
                    (48, vec![0x91, 62, 0]),
                ],
            ],
        );

        let stream = decode(&bytes).unwrap();
        assert_eq!(stream.header.track_count, 2);
        assert_eq!(stream.header.ticks_per_beat, 96);
        assert_eq!(
            stream.events,
            vec![
                RawEvent::new(0, 0, EventKind::Header { ticks_per_beat: 96 }),
                RawEvent::new(1, 0, EventKind::Tempo { microseconds_per_beat: 500_000 }),
                RawEvent::new(2, 0, EventKind::NoteOn { channel: 0, pitch: 60, velocity: 100 }),
                RawEvent::new(2, 96, EventKind::NoteOff { channel: 0, pitch: 60, velocity: 0 }),
                RawEvent::new(2, 144, EventKind::NoteOn { channel: 1, pitch: 62, velocity: 90 }),
                RawEvent::new(2, 192, EventKind::NoteOn { channel: 1, pitch: 62, velocity: 0 }),
            ]
        );
    }

    #[test]
    fn skips_events_the_converter_ignores() {
        let bytes = smf(
            480,
            &[vec![
                (0, vec![0xc0, 5]),
                (0, vec![0xff, 0x03, 0x02, b'h', b'i']),
                (10, vec![0xb0, 7, 100]),
            ]],
        );

        let stream = decode(&bytes).unwrap();
        assert_eq!(stream.events.len(), 1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(b"not a midi file"), Err(Error::Midi(_))));
    }
}
