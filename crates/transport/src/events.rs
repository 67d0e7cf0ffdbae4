/// One timestamped fundamental-frequency estimate from the analysis worker.
///
/// `frequency_hz` is None when the window contained no voiced content in the
/// (50, 800) Hz band. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Playback position the analyzed window started at.
    pub timestamp_ms: u64,
    pub frequency_hz: Option<f32>,
    /// Playback episode this sample belongs to.
    pub session_id: u64,
}

/// Events crossing from the playback core to the UI boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// A fresh pitch estimate from the analysis worker.
    Pitch(PitchSample),
    /// The analysis window ran past the end of the buffer; fired once per
    /// session. This is the ordinary end-of-track transition, not an error.
    PlaybackEnded { session_id: u64 },
    /// The transport stopped; any pitch display should be cleared.
    VisualizationCleared,
}

impl PlayerEvent {
    /// The session this event is tagged with, if any. Consumers drop events
    /// whose id no longer matches the live session.
    pub fn session_id(&self) -> Option<u64> {
        match self {
            PlayerEvent::Pitch(sample) => Some(sample.session_id),
            PlayerEvent::PlaybackEnded { session_id } => Some(*session_id),
            PlayerEvent::VisualizationCleared => None,
        }
    }
}
