use std::sync::Arc;
use std::time::Duration;

use pitchplay_transport::{
    AudioArc, CancellationToken, PitchSample, PlayerEvent, PositionClock, WorkerHandle,
};

use crate::pitch::estimate_pitch;

/// Length of the sample window handed to the estimator.
pub const ANALYSIS_WINDOW_MS: u64 = 200;
/// Sleep between analysis iterations. Governs the visualization refresh
/// rate, decoupled from the window length.
pub const ANALYSIS_TICK: Duration = Duration::from_millis(100);
/// Capacity of the worker-to-UI event ring.
pub const EVENT_RING_CAPACITY: usize = 256;

pub type EventProducer = rtrb::Producer<PlayerEvent>;
pub type EventConsumer = rtrb::Consumer<PlayerEvent>;

/// Create the single-producer/single-consumer ring carrying events for one
/// playback episode from the worker to the UI thread.
pub fn event_ring() -> (EventProducer, EventConsumer) {
    rtrb::RingBuffer::new(EVENT_RING_CAPACITY)
}

/// Background analysis loop for one playback episode.
///
/// The worker owns a clone of the session buffer (pinning it for the life of
/// the thread), samples the shared position clock, and publishes pitch
/// estimates tagged with its session id. Cancellation is cooperative: the
/// token is checked at every loop boundary, so cancellation latency is
/// bounded by one tick plus estimation time.
pub struct AnalysisWorker;

impl AnalysisWorker {
    pub fn spawn(
        clock: Arc<PositionClock>,
        audio: AudioArc,
        token: CancellationToken,
        mut events: EventProducer,
    ) -> WorkerHandle {
        WorkerHandle::spawn(token, move |token| {
            run(&clock, &audio, &token, &mut events);
        })
    }
}

fn run(
    clock: &PositionClock,
    audio: &AudioArc,
    token: &CancellationToken,
    events: &mut EventProducer,
) {
    let session_id = token.session_id();
    let sample_rate = audio.sample_rate() as u64;
    let window_frames = (sample_rate * ANALYSIS_WINDOW_MS / 1000) as usize;

    loop {
        if token.is_signaled() {
            log::trace!("analysis worker {session_id} cancelled");
            return;
        }

        // One locked snapshot of the clock; never decomposed reads.
        let pos_ms = clock.position_ms();
        let start_frame = (pos_ms * sample_rate / 1000) as usize;

        if start_frame + window_frames > audio.frames() {
            // Ordinary end-of-track: report once and exit.
            publish(events, PlayerEvent::PlaybackEnded { session_id });
            return;
        }

        let window = mono_window(audio, start_frame, window_frames);
        match estimate_pitch(&window, audio.sample_rate()) {
            Ok(frequency_hz) => {
                publish(
                    events,
                    PlayerEvent::Pitch(PitchSample {
                        timestamp_ms: pos_ms,
                        frequency_hz,
                        session_id,
                    }),
                );
            }
            Err(err) => {
                // Transient; skip this window's publish and keep looping.
                log::warn!("skipping analysis window at {pos_ms} ms: {err}");
            }
        }

        std::thread::sleep(ANALYSIS_TICK);
        // The loop head re-checks the token first thing after waking.
    }
}

fn publish(events: &mut EventProducer, event: PlayerEvent) {
    if events.push(event).is_err() {
        log::debug!("event ring unavailable, dropping {event:?}");
    }
}

/// Mix `frames` frames starting at `start_frame` down to mono.
fn mono_window(audio: &AudioArc, start_frame: usize, frames: usize) -> Vec<f32> {
    let channels = audio.channels() as usize;
    let samples = audio.samples();
    (start_frame..start_frame + frames)
        .map(|frame| {
            let base = frame * channels;
            samples[base..base + channels].iter().sum::<f32>() / channels as f32
        })
        .collect()
}
