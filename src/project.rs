use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::{Instrument, InstrumentId, Waveform};
use crate::convert::Score;
use crate::error::Result;
use crate::timing::PlaybackTrack;

pub type TrackId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub instrument_id: InstrumentId,
    pub notation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentLibrary {
    instruments: Vec<Instrument>,
    next_id: InstrumentId,
}

impl Default for InstrumentLibrary {
    fn default() -> Self {
        let instruments = vec![
            Instrument::new(1, "Round Triangle", Waveform::Triangle),
            Instrument::new(2, "Soft Sine", Waveform::Sine),
            Instrument::new(3, "Chip Square", Waveform::Square),
            Instrument::new(4, "Sharp Saw", Waveform::Sawtooth),
            Instrument::new(5, "E-Piano", Waveform::Sine),
            Instrument::new(6, "Bass", Waveform::Sawtooth),
        ];
        Self {
            next_id: 7,
            instruments,
        }
    }
}

impl InstrumentLibrary {
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn get(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.name == name)
    }

    pub fn add(&mut self, name: impl Into<String>, waveform: Waveform) -> InstrumentId {
        let id = self.next_id;
        self.next_id += 1;
        self.instruments.push(Instrument::new(id, name, waveform));
        id
    }

    pub fn remove(&mut self, id: InstrumentId) -> Option<Instrument> {
        let index = self.instruments.iter().position(|i| i.id == id)?;
        Some(self.instruments.remove(index))
    }

    /// The instrument following `id` in library order, wrapping around.
    pub fn next_after(&self, id: InstrumentId) -> Option<&Instrument> {
        let index = self.instruments.iter().position(|i| i.id == id).unwrap_or(0);
        self.instruments
            .get(index + 1)
            .or_else(|| self.instruments.first())
    }

    /// Merges a handoff into the library. Instruments are matched by name;
    /// unknown names are added with fresh ids. Each track binds to the
    /// instrument of the same name, or to instrument 1 when there is none.
    pub fn import(&mut self, handoff: &Handoff) -> Vec<Track> {
        for instrument in &handoff.instruments {
            if self.find_by_name(&instrument.name).is_none() {
                self.add(instrument.name.clone(), instrument.waveform);
            }
        }
        if let Some(max) = self.instruments.iter().map(|i| i.id).max() {
            self.next_id = self.next_id.max(max + 1);
        }

        handoff
            .tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let instrument_id = self
                    .find_by_name(&track.instrument_name)
                    .map_or(1, |inst| inst.id);
                Track {
                    id: i + 1,
                    name: format!("Track {}", i + 1),
                    instrument_id,
                    notation: track.notation.clone(),
                }
            })
            .collect()
    }

    /// Resolves tracks to playable form, skipping blank notation and tracks
    /// whose instrument no longer exists.
    pub fn playback_tracks(&self, tracks: &[Track]) -> Vec<PlaybackTrack> {
        tracks
            .iter()
            .filter(|t| !t.notation.trim().is_empty())
            .filter_map(|t| {
                let Some(instrument) = self.get(t.instrument_id) else {
                    warn!(track = t.id, instrument = t.instrument_id, "unknown instrument, skipping track");
                    return None;
                };
                Some(PlaybackTrack {
                    track_id: t.id,
                    name: t.name.clone(),
                    instrument: instrument.clone(),
                    notation: t.notation.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffTrack {
    pub instrument_name: String,
    pub notation: String,
}

/// What the converter passes to the player: instrument definitions plus
/// lanes that refer to them by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Handoff {
    pub instruments: Vec<Instrument>,
    pub tracks: Vec<HandoffTrack>,
}

impl Handoff {
    /// One instrument per score part, one track per lane.
    pub fn from_score(score: &Score, waveform: Waveform) -> Self {
        let instruments = score
            .parts
            .iter()
            .enumerate()
            .map(|(i, part)| Instrument::new(i as InstrumentId + 1, part.name.clone(), waveform))
            .collect();
        let tracks = score
            .parts
            .iter()
            .flat_map(|part| {
                part.lanes.iter().map(|lane| HandoffTrack {
                    instrument_name: part.name.clone(),
                    notation: lane.notation.clone(),
                })
            })
            .collect();
        Self { instruments, tracks }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(ron::ser::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Decodes `text`, falling back to the demo score when it is malformed.
    pub fn decode_or_demo(text: &str) -> Self {
        match Self::decode(text) {
            Ok(handoff) => {
                debug!(tracks = handoff.tracks.len(), "handoff received");
                handoff
            }
            Err(e) => {
                warn!("failed to decode handoff, loading demo score: {e}");
                Self::demo()
            }
        }
    }

    /// Ode to Joy: melody on the first default instrument, bass on the second.
    pub fn demo() -> Self {
        let library = InstrumentLibrary::default();
        let name = |id| library.get(id).map(|i| i.name.clone()).unwrap_or_default();
        Self {
            instruments: Vec::new(),
            tracks: vec![
                HandoffTrack {
                    instrument_name: name(1),
                    notation: ODE_TO_JOY_MELODY.to_string(),
                },
                HandoffTrack {
                    instrument_name: name(2),
                    notation: ODE_TO_JOY_BASS.to_string(),
                },
            ],
        }
    }
}

const ODE_TO_JOY_MELODY: &str = "E4/500 E4/500 F4/500 G4/500 G4/500 F4/500 E4/500 D4/500 \
C4/500 C4/500 D4/500 E4/500 E4/750 D4/250 D4/1000 E4/500 E4/500 F4/500 G4/500 G4/500 F4/500 \
E4/500 D4/500 C4/500 C4/500 D4/500 E4/500 D4/750 C4/250 C4/1000 D4/500 D4/500 E4/500 C4/500 \
D4/500 E4/250 F4/250 E4/500 C4/500 D4/500 E4/250 F4/250 E4/500 D4/500 C4/500 D4/500 G3/1000 \
E4/500 E4/500 F4/500 G4/500 G4/500 F4/500 E4/500 D4/500 C4/500 C4/500 D4/500 E4/500 D4/750 \
C4/250 C4/1000";

const ODE_TO_JOY_BASS: &str = "C3/1000 G3/1000 C3/1000 G3/1000 C3/500 G3/500 C3/500 G3/500 \
C3/500 G3/500 C3/500 G3/500 F3/1000 C3/1000 F3/1000 C3/1000 C3/1000 G3/1000 C3/1000 G3/1000 \
C3/1000 G3/1000 C3/1000 G3/1000 C3/500 G3/500 C3/500 G3/500 C3/500 G3/500 C3/500 G3/500 \
F3/1000 C3/1000 F3/1000 C3/1000 C3/1000 G3/1000 C3/1000 G3/1000";
