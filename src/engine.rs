use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, select};
use tracing::{debug, info};

use crate::audio::{Envelope, Instrument, RenderRequest, ToneSink};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::events::{PlaybackListener, TransportEvent};
use crate::project::TrackId;
use crate::timing::{self, CompiledScore, PlaybackStatus, ScheduledNote, Scheduler};

enum EngineCommand {
    Start {
        score: CompiledScore,
        active_tracks: HashSet<TrackId>,
        listener: Arc<dyn PlaybackListener>,
    },
    Pause,
    Resume,
    Seek(u64),
    UpdateActiveTracks(HashSet<TrackId>),
    UpdateInstrument { track_id: TrackId, instrument: Instrument },
    Transpose(i32),
    Stop { ack: Sender<()> },
    Shutdown,
}

/// Handle to the engine thread. Every control is a message; the thread is
/// the only owner of the [`Scheduler`], so operations never interleave with
/// a tick.
pub struct Player {
    command_tx: Sender<EngineCommand>,
    status: Arc<ArcSwap<PlaybackStatus>>,
    thread: Option<JoinHandle<()>>,
}

impl Player {
    pub fn spawn(config: PlayerConfig, sink: Box<dyn ToneSink>) -> Self {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let status = Arc::new(ArcSwap::from_pointee(PlaybackStatus::default()));

        let engine_status = status.clone();
        let thread = std::thread::spawn(move || {
            engine_thread(config, sink, command_rx, engine_status);
        });

        Self {
            command_tx,
            status,
            thread: Some(thread),
        }
    }

    /// Compiles `tracks` and starts playing them, replacing any current
    /// session. Returns the compiled score so callers can show its length.
    pub fn start(
        &self,
        tracks: &[timing::PlaybackTrack],
        active_tracks: HashSet<TrackId>,
        listener: Arc<dyn PlaybackListener>,
    ) -> Result<CompiledScore> {
        let score = timing::compile(tracks);
        self.send(EngineCommand::Start {
            score: score.clone(),
            active_tracks,
            listener,
        })?;
        Ok(score)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(EngineCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(EngineCommand::Resume)
    }

    pub fn seek(&self, target_ms: u64) -> Result<()> {
        self.send(EngineCommand::Seek(target_ms))
    }

    pub fn update_active_tracks(&self, active_tracks: HashSet<TrackId>) -> Result<()> {
        self.send(EngineCommand::UpdateActiveTracks(active_tracks))
    }

    pub fn update_instrument(&self, track_id: TrackId, instrument: Instrument) -> Result<()> {
        self.send(EngineCommand::UpdateInstrument { track_id, instrument })
    }

    pub fn transpose(&self, semitones: i32) -> Result<()> {
        self.send(EngineCommand::Transpose(semitones))
    }

    /// Blocks until the engine has stopped. No listener callback fires
    /// after this returns.
    pub fn stop(&self) -> Result<()> {
        let (ack_tx, ack_rx) = crossbeam::channel::bounded(1);
        self.send(EngineCommand::Stop { ack: ack_tx })?;
        ack_rx.recv().map_err(|_| Error::EngineGone)
    }

    pub fn state(&self) -> PlaybackStatus {
        **self.status.load()
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.command_tx.send(command).map_err(|_| Error::EngineGone)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Cues for one committed note. Releases sort before onsets at equal
/// deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Cue {
    Off,
    On,
}

struct Timer {
    deadline: Instant,
    cue: Cue,
    serial: u64,
    note: ScheduledNote,
}

impl Timer {
    fn key(&self) -> (Instant, Cue, u64) {
        (self.deadline, self.cue, self.serial)
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

struct EngineState {
    scheduler: Scheduler,
    sink: Box<dyn ToneSink>,
    envelope: Envelope,
    listener: Option<Arc<dyn PlaybackListener>>,
    timers: BinaryHeap<Reverse<Timer>>,
    /// Serials of notes whose onset cue has fired.
    sounding: HashSet<u64>,
    next_serial: u64,
    last_tick: Instant,
    status: Arc<ArcSwap<PlaybackStatus>>,
}

impl EngineState {
    fn publish_status(&self) {
        let current = self.scheduler.state().status();
        if **self.status.load() != current {
            self.status.store(Arc::new(current));
        }
    }

    fn apply(&mut self, events: Vec<TransportEvent>) {
        for event in events {
            match event {
                TransportEvent::NoteOn { note, offset_ms } => {
                    let start_offset = Duration::from_millis(offset_ms);
                    let duration = Duration::from_millis(note.duration_ms);
                    self.sink.render(RenderRequest {
                        frequency: note.frequency,
                        waveform: note.waveform,
                        start_offset,
                        duration,
                        envelope: self.envelope,
                    });
                    self.schedule(note, start_offset, duration);
                }
                TransportEvent::Progress(progress) => {
                    if let Some(listener) = &self.listener {
                        listener.on_progress_update(progress);
                    }
                }
                TransportEvent::Silence => {
                    self.sink.silence_all();
                    self.flush_timers();
                }
                TransportEvent::Mute(active_tracks) => {
                    // Cues of muted tracks are dropped; sounding ones are released now.
                    let (muted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timers)
                        .into_iter()
                        .partition(|Reverse(timer)| !active_tracks.contains(&timer.note.track_id));
                    self.timers = kept.into_iter().collect();
                    for Reverse(timer) in muted {
                        if timer.cue == Cue::Off && self.sounding.remove(&timer.serial) {
                            self.note_off(&timer.note);
                        }
                    }
                    if let Some(listener) = &self.listener {
                        listener.on_mute(&active_tracks);
                    }
                }
                TransportEvent::Ended => {
                    self.expire_timers(Instant::now());
                    self.flush_timers();
                    self.publish_status();
                    if let Some(listener) = self.listener.take() {
                        listener.on_playback_end();
                    }
                }
            }
        }
    }

    /// Queues the onset and release cues of a note rendered `start_offset`
    /// ahead of now.
    fn schedule(&mut self, note: ScheduledNote, start_offset: Duration, duration: Duration) {
        let onset = Instant::now() + start_offset;
        let serial = self.next_serial;
        self.next_serial += 1;
        self.timers.push(Reverse(Timer {
            deadline: onset,
            cue: Cue::On,
            serial,
            note: note.clone(),
        }));
        self.timers.push(Reverse(Timer {
            deadline: onset + duration,
            cue: Cue::Off,
            serial,
            note,
        }));
    }

    fn fire(&mut self, timer: Timer) {
        match timer.cue {
            Cue::On => {
                self.sounding.insert(timer.serial);
                if let Some(listener) = &self.listener {
                    let note = &timer.note;
                    listener.on_note_on(&note.instrument, &note.track_name, &note.note_name);
                }
            }
            Cue::Off => {
                if self.sounding.remove(&timer.serial) {
                    self.note_off(&timer.note);
                }
            }
        }
    }

    /// Fires every cue whose deadline has passed.
    fn expire_timers(&mut self, now: Instant) {
        while let Some(Reverse(next)) = self.timers.peek() {
            if next.deadline > now {
                break;
            }
            if let Some(Reverse(timer)) = self.timers.pop() {
                self.fire(timer);
            }
        }
    }

    /// Drops every pending cue. Sounding notes get their note-off; notes
    /// that never started get nothing.
    fn flush_timers(&mut self) {
        while let Some(Reverse(timer)) = self.timers.pop() {
            if timer.cue == Cue::Off && self.sounding.remove(&timer.serial) {
                self.note_off(&timer.note);
            }
        }
        self.sounding.clear();
    }

    fn note_off(&self, note: &ScheduledNote) {
        if let Some(listener) = &self.listener {
            listener.on_note_off(&note.instrument, &note.track_name, &note.note_name);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.peek().map(|Reverse(timer)| timer.deadline)
    }
}

fn engine_thread(
    config: PlayerConfig,
    sink: Box<dyn ToneSink>,
    command_rx: Receiver<EngineCommand>,
    status: Arc<ArcSwap<PlaybackStatus>>,
) {
    let ticker = crossbeam::channel::tick(config.tick_interval());
    let mut state = EngineState {
        scheduler: Scheduler::new(config.lookahead()),
        sink,
        envelope: config.envelope,
        listener: None,
        timers: BinaryHeap::new(),
        sounding: HashSet::new(),
        next_serial: 0,
        last_tick: Instant::now(),
        status,
    };
    debug!(tick_ms = config.tick_interval_ms, lookahead_ms = config.lookahead_ms, "engine thread started");

    loop {
        let cue_timer = match state.next_deadline() {
            Some(deadline) => crossbeam::channel::at(deadline),
            None => crossbeam::channel::never(),
        };

        select! {
            recv(command_rx) -> command => {
                let Ok(command) = command else { break };
                if !handle_command(&mut state, command) {
                    break;
                }
            }
            recv(ticker) -> _ => {
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_tick);
                state.last_tick = now;
                let events = state.scheduler.tick(elapsed);
                state.apply(events);
            }
            recv(cue_timer) -> _ => {
                state.expire_timers(Instant::now());
            }
        }

        state.publish_status();
    }

    let events = state.scheduler.stop();
    state.apply(events);
    state.publish_status();
    debug!("engine thread exiting");
}

/// Returns `false` when the thread should exit.
fn handle_command(state: &mut EngineState, command: EngineCommand) -> bool {
    match command {
        EngineCommand::Start {
            score,
            active_tracks,
            listener,
        } => {
            let events = state.scheduler.start(score, active_tracks);
            state.apply(events);
            state.listener = Some(listener);
            state.last_tick = Instant::now();
        }
        EngineCommand::Pause => {
            let events = state.scheduler.pause();
            state.apply(events);
        }
        EngineCommand::Resume => {
            let events = state.scheduler.resume();
            state.apply(events);
            state.last_tick = Instant::now();
        }
        EngineCommand::Seek(target_ms) => {
            let events = state.scheduler.seek(target_ms);
            state.apply(events);
        }
        EngineCommand::UpdateActiveTracks(active_tracks) => {
            let events = state.scheduler.update_active_tracks(active_tracks);
            state.apply(events);
        }
        EngineCommand::UpdateInstrument { track_id, instrument } => {
            state.scheduler.update_instrument(track_id, &instrument);
        }
        EngineCommand::Transpose(semitones) => {
            let changed = state.scheduler.transpose(semitones);
            debug!(semitones, changed, "transposed pending notes");
        }
        EngineCommand::Stop { ack } => {
            let events = state.scheduler.stop();
            state.apply(events);
            state.flush_timers();
            state.listener = None;
            state.publish_status();
            info!("player stopped");
            let _ = ack.send(());
        }
        EngineCommand::Shutdown => return false,
    }
    true
}
