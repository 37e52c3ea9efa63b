pub mod audio;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod events;
pub mod midi_file;
pub mod pitch;
pub mod project;
pub mod timing;

pub use config::PlayerConfig;
pub use convert::{AllocationMode, ConversionOutcome, Score, convert};
pub use engine::Player;
pub use error::{Error, Result};
pub use project::{Handoff, InstrumentLibrary, Track, TrackId};
