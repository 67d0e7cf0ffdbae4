//! Live pitch analysis: a spectral estimator and the background worker that
//! runs it against the playback position while a track is playing.

pub mod pitch;
pub mod scheduler;

pub use pitch::{EstimationError, PITCH_MAX_HZ, PITCH_MIN_HZ, estimate_pitch};
pub use scheduler::{
    ANALYSIS_TICK, ANALYSIS_WINDOW_MS, AnalysisWorker, EventConsumer, EventProducer, event_ring,
};
