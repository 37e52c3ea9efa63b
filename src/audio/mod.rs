mod instrument;
mod output;
mod voice;

pub use instrument::{Instrument, InstrumentId, Waveform};
pub use output::{AudioOutput, CpalSink};
pub use voice::{Envelope, Voice};

use std::time::Duration;

/// One note to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Hz; `0.0` renders nothing.
    pub frequency: f64,
    pub waveform: Waveform,
    /// Delay from the moment the request is issued until the note starts.
    pub start_offset: Duration,
    pub duration: Duration,
    pub envelope: Envelope,
}

/// Destination for rendered notes. Requests are fire-and-forget: a sink
/// must never block the caller waiting for audio.
pub trait ToneSink: Send {
    fn render(&mut self, request: RenderRequest);

    /// Cuts every sounding or pending note.
    fn silence_all(&mut self);
}

/// Used when no audio backend is available; transport keeps running.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ToneSink for SilentSink {
    fn render(&mut self, _request: RenderRequest) {}

    fn silence_all(&mut self) {}
}

impl<T: ToneSink + ?Sized> ToneSink for Box<T> {
    fn render(&mut self, request: RenderRequest) {
        (**self).render(request)
    }

    fn silence_all(&mut self) {
        (**self).silence_all()
    }
}
