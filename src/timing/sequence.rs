use tracing::debug;

use crate::audio::{Instrument, Waveform};
use crate::convert::REST;
use crate::pitch::{midi_to_freq, parse_note_name};
use crate::project::TrackId;

/// Used when a token's duration is missing, unparseable or zero, and for
/// tokens whose symbol is not a pitch.
pub const DEFAULT_DURATION_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackTrack {
    pub track_id: TrackId,
    pub name: String,
    pub instrument: Instrument,
    pub notation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNote {
    pub track_id: TrackId,
    pub track_name: String,
    pub instrument: Instrument,
    pub waveform: Waveform,
    pub start_time_ms: u64,
    pub duration_ms: u64,
    pub pitch: i32,
    pub frequency: f64,
    pub note_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledScore {
    /// Sorted by `start_time_ms`; ties keep track order.
    pub notes: Vec<ScheduledNote>,
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Rest { duration_ms: u64 },
    Note { name: &'a str, pitch: i32, duration_ms: u64 },
}

impl Token<'_> {
    pub fn duration_ms(&self) -> u64 {
        match *self {
            Token::Rest { duration_ms } | Token::Note { duration_ms, .. } => duration_ms,
        }
    }
}

/// `C#4/250` -> note, `@/250` or `0/250` -> rest. Anything that does not
/// name a pitch is read as a rest of [`DEFAULT_DURATION_MS`], whatever
/// duration it carries.
pub fn parse_token(token: &str) -> Token<'_> {
    let (symbol, duration) = match token.split_once('/') {
        Some((symbol, rest)) => (symbol, rest.split('/').next()),
        None => (token, None),
    };
    let duration_ms = duration
        .and_then(|d| d.trim().parse::<u64>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_DURATION_MS);

    if symbol == REST || symbol == "0" {
        return Token::Rest { duration_ms };
    }
    match parse_note_name(symbol) {
        Some(pitch) => Token::Note {
            name: symbol,
            pitch,
            duration_ms,
        },
        None => Token::Rest {
            duration_ms: DEFAULT_DURATION_MS,
        },
    }
}

pub fn compile(tracks: &[PlaybackTrack]) -> CompiledScore {
    let mut notes = Vec::new();
    let mut total_duration_ms = 0;

    for track in tracks {
        let mut playhead_ms = 0;

        for token in track.notation.split_whitespace().map(parse_token) {
            if let Token::Note { name, pitch, duration_ms } = token {
                notes.push(ScheduledNote {
                    track_id: track.track_id,
                    track_name: track.name.clone(),
                    instrument: track.instrument.clone(),
                    waveform: track.instrument.waveform,
                    start_time_ms: playhead_ms,
                    duration_ms,
                    pitch,
                    frequency: midi_to_freq(pitch),
                    note_name: name.to_string(),
                });
            }
            playhead_ms += token.duration_ms();
        }

        total_duration_ms = total_duration_ms.max(playhead_ms);
    }

    notes.sort_by_key(|n| n.start_time_ms);
    debug!(notes = notes.len(), total_duration_ms, "compiled notation");

    CompiledScore {
        notes,
        total_duration_ms,
    }
}
