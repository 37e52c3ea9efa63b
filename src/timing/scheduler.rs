//! Transport for one playback session.
//!
//! [`Scheduler`] knows nothing about threads or wall clocks: the owner
//! feeds it elapsed time through [`Scheduler::tick`] and carries out the
//! [`TransportEvent`]s every call returns, in order. Keeping it synchronous
//! is what makes each operation atomic with respect to the others.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, info};

use super::{CompiledScore, ScheduledNote, TransportState};
use crate::audio::Instrument;
use crate::events::{Progress, TransportEvent};
use crate::pitch::midi_to_freq;
use crate::project::TrackId;

#[derive(Debug)]
struct PlaybackSession {
    notes: Vec<ScheduledNote>,
    next_index: usize,
    clock_ms: f64,
    total_duration_ms: u64,
    active_tracks: HashSet<TrackId>,
    played_count: usize,
    /// Start times of committed notes the clock has not reached yet.
    upcoming: VecDeque<u64>,
}

impl PlaybackSession {
    fn count_started(&mut self) {
        while self.upcoming.front().is_some_and(|&start| start as f64 <= self.clock_ms) {
            self.upcoming.pop_front();
            self.played_count += 1;
        }
    }

    /// Hands notes committed ahead of the clock back to the dispatcher.
    fn uncommit_upcoming(&mut self) {
        let clock_ms = self.clock_ms;
        self.next_index = self
            .notes
            .partition_point(|n| n.start_time_ms as f64 <= clock_ms);
        self.upcoming.clear();
    }

    fn progress(&self) -> Progress {
        Progress {
            current_time_ms: (self.clock_ms as u64).min(self.total_duration_ms),
            total_time_ms: self.total_duration_ms,
            played_notes: self.played_count,
            total_notes: self.notes.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    lookahead_ms: u64,
    state: TransportState,
    session: Option<PlaybackSession>,
}

impl Scheduler {
    /// Notes are committed `lookahead` before their start time.
    pub fn new(lookahead: Duration) -> Self {
        Self {
            lookahead_ms: lookahead.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn progress(&self) -> Option<Progress> {
        self.session.as_ref().map(PlaybackSession::progress)
    }

    pub fn start(&mut self, score: CompiledScore, active_tracks: HashSet<TrackId>) -> Vec<TransportEvent> {
        let events = self.stop();
        info!(
            notes = score.notes.len(),
            total_ms = score.total_duration_ms,
            "starting playback"
        );

        self.session = Some(PlaybackSession {
            notes: score.notes,
            next_index: 0,
            clock_ms: 0.0,
            total_duration_ms: score.total_duration_ms,
            active_tracks,
            played_count: 0,
            upcoming: VecDeque::new(),
        });
        self.state = TransportState::Playing;
        events
    }

    pub fn tick(&mut self, elapsed: Duration) -> Vec<TransportEvent> {
        if self.state != TransportState::Playing {
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        session.clock_ms += elapsed.as_secs_f64() * 1000.0;
        let horizon = session.clock_ms + self.lookahead_ms as f64;

        while let Some(note) = session.notes.get(session.next_index) {
            if note.start_time_ms as f64 > horizon {
                break;
            }
            if session.active_tracks.contains(&note.track_id) {
                let offset_ms = (note.start_time_ms as f64 - session.clock_ms).max(0.0).round() as u64;
                events.push(TransportEvent::NoteOn {
                    note: note.clone(),
                    offset_ms,
                });
                session.upcoming.push_back(note.start_time_ms);
            }
            session.next_index += 1;
        }
        session.count_started();

        events.push(TransportEvent::Progress(session.progress()));

        if session.clock_ms >= session.total_duration_ms as f64 {
            info!(played = session.played_count, "playback finished");
            events.push(TransportEvent::Ended);
            self.session = None;
            self.state = TransportState::Ended;
        }
        events
    }

    /// Silences output. Notes committed ahead of the clock are dispatched
    /// again after `resume`.
    pub fn pause(&mut self) -> Vec<TransportEvent> {
        if self.state != TransportState::Playing {
            return Vec::new();
        }
        if let Some(session) = self.session.as_mut() {
            session.uncommit_upcoming();
        }
        self.state = TransportState::Paused;
        debug!(state = %self.state, "transport");
        vec![TransportEvent::Silence]
    }

    pub fn resume(&mut self) -> Vec<TransportEvent> {
        if self.state == TransportState::Paused {
            self.state = TransportState::Playing;
            debug!(state = %self.state, "transport");
        }
        Vec::new()
    }

    /// Moves the clock without dispatching anything. Notes starting before
    /// the target are treated as already played.
    pub fn seek(&mut self, target_ms: u64) -> Vec<TransportEvent> {
        if !self.state.is_active() {
            return Vec::new();
        }
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let target_ms = target_ms.min(session.total_duration_ms);
        session.clock_ms = target_ms as f64;
        session.next_index = session.notes.partition_point(|n| n.start_time_ms < target_ms);
        session.upcoming.clear();
        session.played_count = session.notes[..session.next_index]
            .iter()
            .filter(|n| session.active_tracks.contains(&n.track_id))
            .count();
        debug!(target_ms, next_index = session.next_index, "seek");

        vec![TransportEvent::Silence, TransportEvent::Progress(session.progress())]
    }

    pub fn update_active_tracks(&mut self, active_tracks: HashSet<TrackId>) -> Vec<TransportEvent> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.active_tracks = active_tracks.clone();
        vec![TransportEvent::Mute(active_tracks)]
    }

    /// Swaps the instrument on every note of `track_id` that has not been
    /// dispatched yet. Returns how many notes changed.
    pub fn update_instrument(&mut self, track_id: TrackId, instrument: &Instrument) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let mut changed = 0;
        for note in &mut session.notes[session.next_index..] {
            if note.track_id == track_id {
                note.instrument = instrument.clone();
                note.waveform = instrument.waveform;
                changed += 1;
            }
        }
        debug!(track_id, instrument = %instrument.name, changed, "instrument swapped");
        changed
    }

    /// Shifts every pending note by `semitones` from its written pitch.
    pub fn transpose(&mut self, semitones: i32) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let pending = &mut session.notes[session.next_index..];
        for note in pending.iter_mut() {
            note.frequency = midi_to_freq(note.pitch + semitones);
        }
        pending.len()
    }

    pub fn stop(&mut self) -> Vec<TransportEvent> {
        let was_active = self.state.is_active();
        self.session = None;
        self.state = TransportState::Idle;
        if was_active {
            info!("playback stopped");
            vec![TransportEvent::Silence]
        } else {
            Vec::new()
        }
    }
}
