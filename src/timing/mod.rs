mod scheduler;
mod sequence;
mod state_machine;

pub use scheduler::Scheduler;
pub use sequence::{
    CompiledScore, DEFAULT_DURATION_MS, PlaybackTrack, ScheduledNote, Token, compile, parse_token,
};
pub use state_machine::{PlaybackStatus, TransportState};
