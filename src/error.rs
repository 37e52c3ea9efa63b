use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid MIDI file: {0}")]
    Midi(#[from] midly::Error),

    #[error("invalid RON: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to encode RON: {0}")]
    Encode(#[from] ron::Error),

    #[error("no audio output device")]
    NoOutputDevice,

    #[error("audio config: {0}")]
    AudioConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("audio stream: {0}")]
    AudioStream(#[from] cpal::BuildStreamError),

    #[error("audio playback: {0}")]
    AudioPlay(#[from] cpal::PlayStreamError),

    #[error("player engine is no longer running")]
    EngineGone,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
