use std::collections::HashSet;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};

use crate::audio::Instrument;
use crate::project::TrackId;
use crate::timing::ScheduledNote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub current_time_ms: u64,
    pub total_time_ms: u64,
    pub played_notes: usize,
    pub total_notes: usize,
}

/// Side effects requested by the scheduler, in the order they must happen.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Commit a note; it should start sounding `offset_ms` from now.
    NoteOn { note: ScheduledNote, offset_ms: u64 },
    Progress(Progress),
    /// Cut everything that is currently sounding.
    Silence,
    Mute(HashSet<TrackId>),
    Ended,
}

/// Callbacks for a playback session, invoked from the engine thread.
pub trait PlaybackListener: Send + Sync {
    fn on_note_on(&self, _instrument: &Instrument, _track_name: &str, _note_name: &str) {}

    fn on_note_off(&self, _instrument: &Instrument, _track_name: &str, _note_name: &str) {}

    fn on_progress_update(&self, _progress: Progress) {}

    fn on_playback_end(&self) {}

    fn on_mute(&self, _active_track_ids: &HashSet<TrackId>) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackUpdate {
    NoteOn {
        instrument: Instrument,
        track_name: String,
        note_name: String,
    },
    NoteOff {
        instrument: Instrument,
        track_name: String,
        note_name: String,
    },
    Progress(Progress),
    Ended,
    Mute(HashSet<TrackId>),
}

/// Forwards every callback as a [`PlaybackUpdate`] so another thread can
/// consume them at its own pace.
pub struct ChannelListener {
    update_tx: Sender<PlaybackUpdate>,
}

impl ChannelListener {
    pub fn channel() -> (Arc<Self>, Receiver<PlaybackUpdate>) {
        let (update_tx, update_rx) = crossbeam::channel::unbounded();
        (Arc::new(Self { update_tx }), update_rx)
    }
}

impl PlaybackListener for ChannelListener {
    fn on_note_on(&self, instrument: &Instrument, track_name: &str, note_name: &str) {
        let _ = self.update_tx.send(PlaybackUpdate::NoteOn {
            instrument: instrument.clone(),
            track_name: track_name.to_string(),
            note_name: note_name.to_string(),
        });
    }

    fn on_note_off(&self, instrument: &Instrument, track_name: &str, note_name: &str) {
        let _ = self.update_tx.send(PlaybackUpdate::NoteOff {
            instrument: instrument.clone(),
            track_name: track_name.to_string(),
            note_name: note_name.to_string(),
        });
    }

    fn on_progress_update(&self, progress: Progress) {
        let _ = self.update_tx.send(PlaybackUpdate::Progress(progress));
    }

    fn on_playback_end(&self) {
        let _ = self.update_tx.send(PlaybackUpdate::Ended);
    }

    fn on_mute(&self, active_track_ids: &HashSet<TrackId>) {
        let _ = self.update_tx.send(PlaybackUpdate::Mute(active_track_ids.clone()));
    }
}
