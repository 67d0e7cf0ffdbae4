pub mod player;

pub use player::{Player, TransportState};

pub use pitchplay_analysis::{ANALYSIS_TICK, ANALYSIS_WINDOW_MS, estimate_pitch};
pub use pitchplay_decode::{LoadError, decode_file};
pub use pitchplay_engine::CpalSink;
pub use pitchplay_transport::{
    AudioArc, DEFAULT_JOIN_TIMEOUT, PitchSample, PlaybackSink, PlayerEvent, PositionClock,
};
