use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notelane::audio::{Instrument, RenderRequest, SilentSink, ToneSink, Waveform};
use notelane::events::{PlaybackListener, Progress};
use notelane::timing::{PlaybackStatus, PlaybackTrack};
use notelane::{Player, PlayerConfig, TrackId};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    NoteOn(String, String),
    NoteOff(String, String),
    Progress(Progress),
    Mute(Vec<TrackId>),
    End,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn note_ons(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::NoteOn(_, note) => Some(note),
                _ => None,
            })
            .collect()
    }

    fn wait_for(&self, what: impl Fn(&[Call]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !what(&self.calls()) {
            assert!(Instant::now() < deadline, "timed out, saw {:?}", self.calls());
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl PlaybackListener for Recorder {
    fn on_note_on(&self, _instrument: &Instrument, track_name: &str, note_name: &str) {
        self.calls.lock().unwrap().push(Call::NoteOn(track_name.into(), note_name.into()));
    }

    fn on_note_off(&self, _instrument: &Instrument, track_name: &str, note_name: &str) {
        self.calls.lock().unwrap().push(Call::NoteOff(track_name.into(), note_name.into()));
    }

    fn on_progress_update(&self, progress: Progress) {
        self.calls.lock().unwrap().push(Call::Progress(progress));
    }

    fn on_playback_end(&self) {
        self.calls.lock().unwrap().push(Call::End);
    }

    fn on_mute(&self, active_track_ids: &HashSet<TrackId>) {
        let mut ids: Vec<TrackId> = active_track_ids.iter().copied().collect();
        ids.sort_unstable();
        self.calls.lock().unwrap().push(Call::Mute(ids));
    }
}

#[derive(Clone, Default)]
struct CountingSink {
    frequencies: Arc<Mutex<Vec<f64>>>,
}

impl ToneSink for CountingSink {
    fn render(&mut self, request: RenderRequest) {
        self.frequencies.lock().unwrap().push(request.frequency);
    }

    fn silence_all(&mut self) {}
}

fn config() -> PlayerConfig {
    PlayerConfig {
        tick_interval_ms: 2,
        lookahead_ms: 10,
        ..PlayerConfig::default()
    }
}

fn track(id: TrackId, notation: &str) -> PlaybackTrack {
    PlaybackTrack {
        track_id: id,
        name: format!("Track {id}"),
        instrument: Instrument::new(1, "Round Triangle", Waveform::Triangle),
        notation: notation.into(),
    }
}

fn is_end(calls: &[Call]) -> bool {
    calls.contains(&Call::End)
}

#[test]
fn every_note_is_dispatched_once_in_time_order() {
    let sink = CountingSink::default();
    let player = Player::spawn(config(), Box::new(sink.clone()));
    let recorder = Arc::new(Recorder::default());

    player
        .start(
            &[track(1, "A4/20 @/20 C5/20"), track(2, "@/30 E4/20")],
            [1, 2].into(),
            recorder.clone(),
        )
        .unwrap();
    recorder.wait_for(is_end);

    assert_eq!(recorder.note_ons(), vec!["A4", "E4", "C5"]);
    let calls = recorder.calls();
    assert_eq!(calls.iter().filter(|c| **c == Call::End).count(), 1);
    assert_eq!(calls.last(), Some(&Call::End));

    let last_progress = calls
        .iter()
        .rev()
        .find_map(|c| match c {
            Call::Progress(p) => Some(*p),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_progress.current_time_ms, 60);
    assert_eq!(last_progress.played_notes, 3);

    let frequencies = sink.frequencies.lock().unwrap().clone();
    assert_eq!(frequencies.len(), 3);
    assert!((frequencies[0] - 440.0).abs() < 1e-9);
    assert_eq!(player.state(), PlaybackStatus::default());
}

#[test]
fn muted_tracks_stay_silent() {
    let player = Player::spawn(config(), Box::new(SilentSink));
    let recorder = Arc::new(Recorder::default());

    player
        .start(&[track(1, "C4/20 D4/20"), track(2, "G4/40")], [2].into(), recorder.clone())
        .unwrap();
    recorder.wait_for(is_end);

    assert_eq!(recorder.note_ons(), vec!["G4"]);
}

#[test]
fn mute_changes_are_reported() {
    let player = Player::spawn(config(), Box::new(SilentSink));
    let recorder = Arc::new(Recorder::default());

    player.start(&[track(1, "C4/5000"), track(2, "E4/5000")], [1, 2].into(), recorder.clone()).unwrap();
    player.update_active_tracks([2].into()).unwrap();
    recorder.wait_for(|calls| calls.contains(&Call::Mute(vec![2])));
    player.stop().unwrap();
}

#[test]
fn nothing_is_reported_after_stop() {
    let player = Player::spawn(config(), Box::new(SilentSink));
    let recorder = Arc::new(Recorder::default());

    player.start(&[track(1, "C4/5000 D4/5000")], [1].into(), recorder.clone()).unwrap();
    recorder.wait_for(|calls| calls.iter().any(|c| matches!(c, Call::NoteOn(..))));
    player.stop().unwrap();

    let seen = recorder.calls().len();
    assert_eq!(player.state(), PlaybackStatus::default());
    // The interrupted note is released on stop.
    assert!(recorder.calls().contains(&Call::NoteOff("Track 1".into(), "C4".into())));

    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(recorder.calls().len(), seen);
    assert!(!is_end(&recorder.calls()));
}

#[test]
fn seek_to_the_end_skips_all_remaining_notes() {
    let player = Player::spawn(config(), Box::new(SilentSink));
    let recorder = Arc::new(Recorder::default());

    player.start(&[track(1, "@/200 C4/200 D4/200")], [1].into(), recorder.clone()).unwrap();
    player.seek(10_000).unwrap();
    recorder.wait_for(is_end);

    assert!(recorder.note_ons().is_empty());
}

#[test]
fn paused_playback_does_not_advance() {
    let player = Player::spawn(config(), Box::new(SilentSink));
    let recorder = Arc::new(Recorder::default());

    player.start(&[track(1, "@/100 C4/100")], [1].into(), recorder.clone()).unwrap();
    player.pause().unwrap();
    recorder.wait_for(|_| player.state().is_paused);

    std::thread::sleep(Duration::from_millis(200));
    assert!(recorder.note_ons().is_empty());

    player.resume().unwrap();
    recorder.wait_for(is_end);
    assert_eq!(recorder.note_ons(), vec!["C4"]);
}

#[test]
fn pausing_before_a_committed_note_still_plays_it_after_resume() {
    let config = PlayerConfig {
        lookahead_ms: 100,
        ..config()
    };
    let player = Player::spawn(config, Box::new(SilentSink));
    let recorder = Arc::new(Recorder::default());

    player.start(&[track(1, "@/60 C4/40")], [1].into(), recorder.clone()).unwrap();
    recorder.wait_for(|calls| calls.iter().any(|c| matches!(c, Call::Progress(_))));
    player.pause().unwrap();
    recorder.wait_for(|_| player.state().is_paused);

    std::thread::sleep(Duration::from_millis(150));
    assert!(recorder.note_ons().is_empty());

    player.resume().unwrap();
    recorder.wait_for(is_end);
    assert_eq!(recorder.note_ons(), vec!["C4"]);
    let last_progress = recorder
        .calls()
        .into_iter()
        .rev()
        .find_map(|c| match c {
            Call::Progress(p) => Some(p),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_progress.played_notes, 1);
}

#[test]
fn instrument_and_transpose_changes_apply_to_pending_notes() {
    let sink = CountingSink::default();
    let player = Player::spawn(config(), Box::new(sink.clone()));
    let recorder = Arc::new(Recorder::default());

    player.start(&[track(1, "@/100 A4/50")], [1].into(), recorder.clone()).unwrap();
    player.update_instrument(1, Instrument::new(3, "Chip Square", Waveform::Square)).unwrap();
    player.transpose(12).unwrap();
    recorder.wait_for(is_end);

    let frequencies = sink.frequencies.lock().unwrap().clone();
    assert_eq!(frequencies.len(), 1);
    assert!((frequencies[0] - 880.0).abs() < 1e-9);
}
