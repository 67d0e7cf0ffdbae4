use crate::AudioArc;

/// External playback output consumed by the transport controller.
///
/// The cpal engine implements this over a real output device; controller
/// tests inject a mock. All methods are issued from the UI/control thread and
/// must not block beyond pushing a command toward the audio callback.
pub trait PlaybackSink {
    /// Replace (or clear, with None) the buffer subsequent `play` calls read.
    fn set_buffer(&mut self, audio: Option<AudioArc>) -> anyhow::Result<()>;

    /// Begin output at `start_offset_ms` into the current buffer.
    fn play(&mut self, start_offset_ms: u64) -> anyhow::Result<()>;

    /// Suspend output, keeping the playback cursor where it is.
    fn pause(&mut self);

    /// Suspend output and rewind the playback cursor to the start.
    fn stop(&mut self);

    /// Whether the sink is currently producing audible output.
    fn is_busy(&self) -> bool;
}
