use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam::channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notelane::audio::{AudioOutput, SilentSink, ToneSink, Waveform};
use notelane::events::{ChannelListener, PlaybackUpdate, Progress};
use notelane::{
    AllocationMode, ConversionOutcome, Handoff, InstrumentLibrary, Player, PlayerConfig, Track,
    TrackId, convert, midi_file,
};

const SEEK_STEP_MS: u64 = 5000;

#[derive(Parser)]
#[command(name = "notelane")]
#[command(about = "Turn MIDI files into lane notation and play it back", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lane notation of a MIDI file
    Convert {
        file: PathBuf,

        /// One melody lane plus chord lanes per track
        #[arg(short, long)]
        mono: bool,

        /// Print the player handoff (RON) instead of the text listing
        #[arg(long)]
        ron: bool,
    },

    /// Play a MIDI file, or the demo score when none is given
    Play {
        file: Option<PathBuf>,

        #[arg(short, long)]
        mono: bool,

        /// Player settings (RON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Play once without keyboard controls
        #[arg(long)]
        no_interactive: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert { file, mono, ron } => {
            let outcome = convert_file(&file, mono)?;
            match (&outcome, ron) {
                (ConversionOutcome::Converted(score), true) => {
                    println!("{}", Handoff::from_score(score, Waveform::default()).encode()?);
                }
                _ => print!("{outcome}"),
            }
        }
        Commands::Play {
            file,
            mono,
            config,
            no_interactive,
        } => {
            let config = match config {
                Some(path) => PlayerConfig::load(&path)?,
                None => PlayerConfig::default(),
            };

            let handoff = match file {
                Some(file) => match convert_file(&file, mono)? {
                    ConversionOutcome::NoNotesFound => {
                        println!("no notes found");
                        return Ok(());
                    }
                    ConversionOutcome::Converted(score) => {
                        let encoded = Handoff::from_score(&score, config.default_waveform).encode()?;
                        Handoff::decode_or_demo(&encoded)
                    }
                },
                None => {
                    info!("no input file, playing the demo score");
                    Handoff::demo()
                }
            };

            play(config, &handoff, !no_interactive)?;
        }
    }

    Ok(())
}

fn convert_file(file: &Path, mono: bool) -> notelane::Result<ConversionOutcome> {
    let mode = if mono {
        AllocationMode::Monophonic
    } else {
        AllocationMode::Polyphonic
    };
    let stream = midi_file::read(file)?;
    Ok(convert(&stream.events, mode))
}

fn play(config: PlayerConfig, handoff: &Handoff, interactive: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut library = InstrumentLibrary::default();
    let mut tracks = library.import(handoff);

    // The stream must outlive the player.
    let (_output, sink): (Option<AudioOutput>, Box<dyn ToneSink>) =
        match AudioOutput::open(config.event_queue_capacity) {
            Ok((output, sink)) => (Some(output), Box::new(sink) as Box<dyn ToneSink>),
            Err(e) => {
                warn!("audio output unavailable, playing silently: {e}");
                (None, Box::new(SilentSink) as Box<dyn ToneSink>)
            }
        };

    let player = Player::spawn(config, sink);
    let (listener, updates) = ChannelListener::channel();
    let active: HashSet<TrackId> = tracks.iter().map(|t| t.id).collect();

    let score = player.start(&library.playback_tracks(&tracks), active.clone(), listener)?;
    for track in &tracks {
        match library.get(track.instrument_id) {
            Some(instrument) => println!(
                "{}: {} ({}, {})",
                track.id, track.name, instrument.name, instrument.waveform
            ),
            None => println!("{}: {} (?)", track.id, track.name),
        }
    }
    println!(
        "{} notes, {}",
        score.notes.len(),
        format_time(score.total_duration_ms)
    );

    if interactive {
        let mut session = Session {
            player: &player,
            library: &library,
            tracks: &mut tracks,
            active,
            selected: 0,
            transpose: 0,
            progress: Progress::default(),
        };
        let _raw = RawMode::enable()?;
        println!("space pause | <- -> seek | 1-9 mute | tab select | i instrument | +/- transpose | q quit\r");
        session.run(&updates)?;
    } else {
        while let Ok(update) = updates.recv() {
            match update {
                PlaybackUpdate::Progress(progress) => print_progress(&progress, "")?,
                PlaybackUpdate::Ended => break,
                _ => {}
            }
        }
    }

    player.stop()?;
    println!();
    Ok(())
}

struct RawMode;

impl RawMode {
    fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

struct Session<'a> {
    player: &'a Player,
    library: &'a InstrumentLibrary,
    tracks: &'a mut [Track],
    active: HashSet<TrackId>,
    selected: usize,
    transpose: i32,
    progress: Progress,
}

impl Session<'_> {
    fn run(&mut self, updates: &Receiver<PlaybackUpdate>) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            while let Ok(update) = updates.try_recv() {
                match update {
                    PlaybackUpdate::Progress(progress) => {
                        self.progress = progress;
                        print_progress(&progress, &self.status_suffix())?;
                    }
                    PlaybackUpdate::Ended => return Ok(()),
                    _ => {}
                }
            }

            if !event::poll(Duration::from_millis(50))? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Char(' ') => {
                    if self.player.state().is_paused {
                        self.player.resume()?;
                    } else {
                        self.player.pause()?;
                    }
                }
                KeyCode::Left => {
                    let target = self.progress.current_time_ms.saturating_sub(SEEK_STEP_MS);
                    self.player.seek(target)?;
                }
                KeyCode::Right => {
                    self.player.seek(self.progress.current_time_ms + SEEK_STEP_MS)?;
                }
                KeyCode::Char(digit @ '1'..='9') => {
                    let Some(track) = digit.to_digit(10).and_then(|d| self.tracks.get(d as usize - 1)) else {
                        continue;
                    };
                    if !self.active.remove(&track.id) {
                        self.active.insert(track.id);
                    }
                    self.player.update_active_tracks(self.active.clone())?;
                }
                KeyCode::Tab => {
                    if !self.tracks.is_empty() {
                        self.selected = (self.selected + 1) % self.tracks.len();
                    }
                }
                KeyCode::Char('i') => self.cycle_instrument()?,
                KeyCode::Char('+') | KeyCode::Char('=') => {
                    self.transpose += 1;
                    self.player.transpose(self.transpose)?;
                }
                KeyCode::Char('-') => {
                    self.transpose -= 1;
                    self.player.transpose(self.transpose)?;
                }
                _ => continue,
            }
            print_progress(&self.progress, &self.status_suffix())?;
        }
    }

    fn cycle_instrument(&mut self) -> notelane::Result<()> {
        let Some(track) = self.tracks.get_mut(self.selected) else {
            return Ok(());
        };
        let Some(next) = self.library.next_after(track.instrument_id) else {
            return Ok(());
        };
        track.instrument_id = next.id;
        self.player.update_instrument(track.id, next.clone())
    }

    fn status_suffix(&self) -> String {
        let Some(track) = self.tracks.get(self.selected) else {
            return String::new();
        };
        let instrument = self
            .library
            .get(track.instrument_id)
            .map_or("?", |i| i.name.as_str());
        let mut muted: Vec<TrackId> = self
            .tracks
            .iter()
            .map(|t| t.id)
            .filter(|id| !self.active.contains(id))
            .collect();
        muted.sort_unstable();
        format!(
            " | {} [{}] | transpose {:+} | muted {:?}",
            track.name, instrument, self.transpose, muted
        )
    }
}

fn print_progress(progress: &Progress, suffix: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(
        stdout,
        "\r{} / {}  notes {}/{}{}",
        format_time(progress.current_time_ms),
        format_time(progress.total_time_ms),
        progress.played_notes,
        progress.total_notes,
        suffix
    )?;
    queue!(stdout, Clear(ClearType::UntilNewLine))?;
    stdout.flush()
}

fn format_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
