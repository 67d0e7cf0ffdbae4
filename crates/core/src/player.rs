use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pitchplay_analysis::{AnalysisWorker, EventConsumer, event_ring};
use pitchplay_decode::{LoadError, decode_file};
use pitchplay_transport::{
    AudioArc, CancellationToken, DEFAULT_JOIN_TIMEOUT, PlaybackSink, PlayerEvent, PositionClock,
    WorkerHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

/// One loaded audio file. Replacing or unloading it destroys the previous
/// session; workers keep their own buffer clone, so a replaced session only
/// invalidates their output, never their reads.
struct PlaybackSession {
    audio: AudioArc,
    duration_ms: u64,
}

/// The transport controller.
///
/// Owns the injected output sink, the loaded session, the position clock and
/// the lifecycle of the background analysis worker. Lives on the UI/control
/// thread; every command either completes its transition or leaves the prior
/// state unchanged. Commands issued with no loaded session are warning-level
/// no-ops.
pub struct Player {
    sink: Box<dyn PlaybackSink>,
    session: Option<PlaybackSession>,
    state: TransportState,
    clock: Arc<PositionClock>,
    worker: Option<WorkerHandle>,
    events: Option<EventConsumer>,
    pending: VecDeque<PlayerEvent>,
    next_session_id: u64,
    current_session_id: u64,
    join_timeout: Duration,
}

impl Player {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            session: None,
            state: TransportState::Stopped,
            clock: Arc::new(PositionClock::new(0)),
            worker: None,
            events: None,
            pending: VecDeque::new(),
            next_session_id: 0,
            current_session_id: 0,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    /// Override the bounded worker-join timeout.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Decode `path` and adopt it as the current session.
    ///
    /// The previous session (and its worker) is torn down first, so a decode
    /// failure leaves the transport Stopped with no session.
    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        self.unload();
        let audio = decode_file(path)?;
        self.install_session(audio)
    }

    /// Adopt an already-decoded buffer as the current session.
    pub fn load_buffer(&mut self, audio: AudioArc) -> Result<(), LoadError> {
        self.unload();
        self.install_session(audio)
    }

    pub fn play(&mut self) {
        if self.session.is_none() {
            log::warn!("play ignored: no file loaded");
            return;
        }
        if self.state.is_playing() {
            return;
        }
        // 0 after load/stop, the frozen offset when resuming or after a seek.
        let offset = self.clock.position_ms();
        self.start_playback(offset);
    }

    pub fn pause(&mut self) {
        if self.session.is_none() {
            log::warn!("pause ignored: no file loaded");
            return;
        }
        if !self.state.is_playing() {
            return;
        }
        self.teardown_worker();
        self.sink.pause();
        let frozen = self.clock.pause();
        log::trace!("paused at {frozen} ms");
        self.state = TransportState::Paused;
    }

    pub fn stop(&mut self) {
        if self.session.is_none() {
            log::warn!("stop ignored: no file loaded");
            return;
        }
        if self.state == TransportState::Stopped {
            return;
        }
        self.teardown_worker();
        self.sink.stop();
        self.clock.reset();
        self.state = TransportState::Stopped;
        self.pending.push_back(PlayerEvent::VisualizationCleared);
    }

    /// Jump to `ms`, clamped into [0, duration].
    ///
    /// While Playing this is stop-then-play at the new offset so the sink and
    /// the worker both restart cleanly there, never an in-place jump.
    pub fn seek(&mut self, ms: u64) {
        if self.session.is_none() {
            log::warn!("seek ignored: no file loaded");
            return;
        }
        match self.state {
            TransportState::Playing => {
                self.teardown_worker();
                self.sink.stop();
                self.clock.pause();
                let target = self.clock.seek(ms);
                if !self.start_playback(target) {
                    self.state = TransportState::Paused;
                }
            }
            TransportState::Stopped | TransportState::Paused => {
                self.clock.seek(ms);
            }
        }
    }

    /// Drain events published since the last poll, in order.
    ///
    /// Runs on the UI/control thread. Events tagged with a session id other
    /// than the live one are discarded here; this guard stays mandatory even
    /// though joins normally succeed, because a publish can race arbitrarily
    /// close to a cancellation boundary.
    pub fn poll(&mut self) -> Vec<PlayerEvent> {
        let mut out: Vec<PlayerEvent> = self.pending.drain(..).collect();
        let mut ended = false;
        if let Some(events) = self.events.as_mut() {
            while let Ok(event) = events.pop() {
                if let Some(session_id) = event.session_id() {
                    if session_id != self.current_session_id {
                        log::debug!("discarding stale event from session {session_id}");
                        continue;
                    }
                }
                if matches!(event, PlayerEvent::PlaybackEnded { .. }) {
                    ended = true;
                }
                out.push(event);
            }
        }
        if ended {
            self.finish_playback();
        }
        out
    }

    /// Current playback position in milliseconds.
    pub fn position_ms(&self) -> u64 {
        self.clock.position_ms()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn duration_ms(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.duration_ms)
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Tear down the current session and return to the unloaded state.
    fn unload(&mut self) {
        self.teardown_worker();
        self.sink.stop();
        if let Err(err) = self.sink.set_buffer(None) {
            log::warn!("failed to clear output buffer: {err}");
        }
        self.session = None;
        self.state = TransportState::Stopped;
        self.clock = Arc::new(PositionClock::new(0));
        // Bump the live id so anything a straggler worker published dies at
        // the poll guard.
        self.current_session_id = self.alloc_session_id();
    }

    fn install_session(&mut self, audio: AudioArc) -> Result<(), LoadError> {
        let duration_ms = audio.duration_ms();
        self.sink.set_buffer(Some(audio.clone()))?;
        self.clock = Arc::new(PositionClock::new(duration_ms));
        self.session = Some(PlaybackSession { audio, duration_ms });
        Ok(())
    }

    /// Start the sink, the clock and a fresh worker at `offset_ms`.
    ///
    /// Returns false (leaving state untouched) when the sink refuses to
    /// start.
    fn start_playback(&mut self, offset_ms: u64) -> bool {
        let audio = match self.session.as_ref() {
            Some(session) => session.audio.clone(),
            None => return false,
        };
        if let Err(err) = self.sink.play(offset_ms) {
            log::error!("output sink refused to start at {offset_ms} ms: {err}");
            return false;
        }
        self.clock.start(offset_ms);

        let session_id = self.alloc_session_id();
        self.current_session_id = session_id;
        let (events_tx, events_rx) = event_ring();
        self.worker = Some(AnalysisWorker::spawn(
            Arc::clone(&self.clock),
            audio,
            CancellationToken::new(session_id),
            events_tx,
        ));
        self.events = Some(events_rx);
        self.state = TransportState::Playing;
        true
    }

    /// Signal and join the live worker within the bounded timeout; a worker
    /// that misses the deadline is abandoned and silenced by the poll guard.
    fn teardown_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let session_id = worker.session_id();
            if !worker.cancel_and_join(self.join_timeout) {
                log::warn!(
                    "analysis worker {session_id} did not exit within {:?}, abandoning it",
                    self.join_timeout
                );
            }
        }
        self.events = None;
    }

    /// End-of-track observed in `poll`: the worker already exited on its own.
    fn finish_playback(&mut self) {
        self.teardown_worker();
        self.sink.stop();
        self.clock.reset();
        self.state = TransportState::Stopped;
    }

    fn alloc_session_id(&mut self) -> u64 {
        self.next_session_id += 1;
        self.next_session_id
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.teardown_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::sync::Mutex;
    use std::thread::sleep;

    const SAMPLE_RATE: u32 = 8000;

    #[derive(Debug, Default)]
    struct SinkLog {
        plays: Vec<u64>,
        pauses: usize,
        stops: usize,
        buffer_sets: usize,
        buffer_clears: usize,
    }

    /// Records every command; shared with the test through an Arc.
    struct MockSink {
        log: Arc<Mutex<SinkLog>>,
        playing: bool,
    }

    impl MockSink {
        fn new() -> (Box<dyn PlaybackSink>, Arc<Mutex<SinkLog>>) {
            let log = Arc::new(Mutex::new(SinkLog::default()));
            (
                Box::new(Self {
                    log: Arc::clone(&log),
                    playing: false,
                }),
                log,
            )
        }
    }

    impl PlaybackSink for MockSink {
        fn set_buffer(&mut self, audio: Option<AudioArc>) -> anyhow::Result<()> {
            let mut log = self.log.lock().unwrap();
            match audio {
                Some(_) => log.buffer_sets += 1,
                None => log.buffer_clears += 1,
            }
            Ok(())
        }

        fn play(&mut self, start_offset_ms: u64) -> anyhow::Result<()> {
            self.log.lock().unwrap().plays.push(start_offset_ms);
            self.playing = true;
            Ok(())
        }

        fn pause(&mut self) {
            self.log.lock().unwrap().pauses += 1;
            self.playing = false;
        }

        fn stop(&mut self) {
            self.log.lock().unwrap().stops += 1;
            self.playing = false;
        }

        fn is_busy(&self) -> bool {
            self.playing
        }
    }

    fn sine_buffer(duration_ms: u64) -> AudioArc {
        let frames = (SAMPLE_RATE as u64 * duration_ms / 1000) as usize;
        let samples = (0..frames)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (2.0 * PI * 440.0 * t).sin()
            })
            .collect();
        AudioArc::new(samples, SAMPLE_RATE, 1)
    }

    fn loaded_player(duration_ms: u64) -> (Player, Arc<Mutex<SinkLog>>) {
        let (sink, log) = MockSink::new();
        let mut player = Player::new(sink);
        player.load_buffer(sine_buffer(duration_ms)).unwrap();
        (player, log)
    }

    #[test]
    fn test_commands_without_session_are_noops() {
        let (sink, log) = MockSink::new();
        let mut player = Player::new(sink);

        player.play();
        player.pause();
        player.stop();
        player.seek(1000);

        assert_eq!(player.state(), TransportState::Stopped);
        assert_eq!(player.position_ms(), 0);
        assert!(player.poll().is_empty());
        assert!(log.lock().unwrap().plays.is_empty());
    }

    #[test]
    fn test_load_adopts_session_stopped_at_zero() {
        let (player, log) = loaded_player(10_000);
        assert!(player.has_session());
        assert_eq!(player.state(), TransportState::Stopped);
        assert_eq!(player.position_ms(), 0);
        assert_eq!(player.duration_ms(), 10_000);
        assert_eq!(log.lock().unwrap().buffer_sets, 1);
    }

    #[test]
    fn test_position_advances_while_playing() {
        let (mut player, log) = loaded_player(10_000);
        player.play();
        assert_eq!(player.state(), TransportState::Playing);
        assert_eq!(log.lock().unwrap().plays, vec![0]);

        sleep(Duration::from_millis(300));
        let pos = player.position_ms();
        assert!((250..=350).contains(&pos), "expected ~300 ms, got {pos}");
    }

    #[test]
    fn test_position_is_monotonic_while_playing() {
        let (mut player, _log) = loaded_player(10_000);
        player.play();
        let mut last = 0;
        for _ in 0..50 {
            let pos = player.position_ms();
            assert!(pos >= last, "position went backwards: {last} -> {pos}");
            last = pos;
            sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_pause_freezes_position() {
        let (mut player, log) = loaded_player(10_000);
        player.play();
        sleep(Duration::from_millis(300));
        player.pause();
        assert_eq!(player.state(), TransportState::Paused);
        assert_eq!(log.lock().unwrap().pauses, 1);

        let frozen = player.position_ms();
        sleep(Duration::from_millis(500));
        assert_eq!(player.position_ms(), frozen);
    }

    #[test]
    fn test_play_resumes_from_paused_offset() {
        let (mut player, log) = loaded_player(10_000);
        player.play();
        sleep(Duration::from_millis(100));
        player.pause();
        let frozen = player.position_ms();

        player.play();
        assert_eq!(player.state(), TransportState::Playing);
        assert_eq!(log.lock().unwrap().plays.last().copied(), Some(frozen));
    }

    #[test]
    fn test_play_while_playing_is_a_noop() {
        let (mut player, log) = loaded_player(10_000);
        player.play();
        player.play();
        assert_eq!(log.lock().unwrap().plays.len(), 1);
    }

    #[test]
    fn test_stop_resets_and_clears_visualization() {
        let (mut player, log) = loaded_player(10_000);
        let stops_before = log.lock().unwrap().stops;
        player.play();
        sleep(Duration::from_millis(50));
        player.stop();

        assert_eq!(player.state(), TransportState::Stopped);
        assert_eq!(player.position_ms(), 0);
        assert_eq!(log.lock().unwrap().stops, stops_before + 1);

        let events = player.poll();
        assert!(events.contains(&PlayerEvent::VisualizationCleared));
    }

    #[test]
    fn test_seek_clamps_out_of_range() {
        let (mut player, _log) = loaded_player(10_000);
        player.seek(20_000);
        assert_eq!(player.position_ms(), 10_000);
    }

    #[test]
    fn test_seek_while_paused_moves_frozen_position() {
        let (mut player, log) = loaded_player(10_000);
        player.play();
        sleep(Duration::from_millis(50));
        player.pause();

        player.seek(5000);
        assert_eq!(player.position_ms(), 5000);
        assert_eq!(player.state(), TransportState::Paused);

        // The next worker starts at the seeked offset.
        player.play();
        assert_eq!(log.lock().unwrap().plays.last().copied(), Some(5000));
        sleep(Duration::from_millis(150));
        let pitch_timestamps: Vec<u64> = player
            .poll()
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::Pitch(sample) => Some(sample.timestamp_ms),
                _ => None,
            })
            .collect();
        assert!(!pitch_timestamps.is_empty());
        assert!(pitch_timestamps.iter().all(|&ts| ts >= 5000));
    }

    #[test]
    fn test_seek_while_playing_restarts_sink_and_worker() {
        let (mut player, log) = loaded_player(10_000);
        let stops_before = log.lock().unwrap().stops;
        player.play();
        sleep(Duration::from_millis(50));
        player.seek(4000);

        assert_eq!(player.state(), TransportState::Playing);
        let log = log.lock().unwrap();
        assert_eq!(log.stops, stops_before + 1);
        assert_eq!(log.plays.len(), 2);
        assert_eq!(log.plays[1], 4000);
    }

    #[test]
    fn test_end_of_track_fires_once_and_stops() {
        let (mut player, _log) = loaded_player(10_000);
        player.seek(9900);
        player.play();

        // 9900 + 200 ms window exceeds the 10000 ms track.
        sleep(Duration::from_millis(150));
        let events = player.poll();
        let ended: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, PlayerEvent::PlaybackEnded { .. }))
            .collect();
        assert_eq!(ended.len(), 1);
        assert_eq!(player.state(), TransportState::Stopped);
        assert_eq!(player.position_ms(), 0);

        // Only once per session.
        sleep(Duration::from_millis(150));
        assert!(player.poll().is_empty());
    }

    #[test]
    fn test_pitch_samples_carry_live_session_id() {
        let (mut player, _log) = loaded_player(10_000);
        player.play();
        sleep(Duration::from_millis(250));
        let events = player.poll();

        let ids: Vec<u64> = events
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::Pitch(sample) => Some(sample.session_id),
                _ => None,
            })
            .collect();
        assert!(!ids.is_empty());
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn test_rapid_play_pause_leaves_no_stale_samples() {
        let (mut player, _log) = loaded_player(10_000);
        for _ in 0..2 {
            player.play();
            player.pause();
            player.play();
            player.pause();
        }
        assert_eq!(player.state(), TransportState::Paused);

        // After the final join no pitch sample from any earlier episode may
        // still be pending.
        let events = player.poll();
        assert!(
            events
                .iter()
                .all(|event| !matches!(event, PlayerEvent::Pitch(_))),
            "stale samples survived: {events:?}"
        );
    }

    #[test]
    fn test_load_replaces_session() {
        let (mut player, log) = loaded_player(10_000);
        player.play();
        sleep(Duration::from_millis(50));

        player.load_buffer(sine_buffer(2000)).unwrap();
        assert_eq!(player.state(), TransportState::Stopped);
        assert_eq!(player.position_ms(), 0);
        assert_eq!(player.duration_ms(), 2000);

        let log = log.lock().unwrap();
        assert_eq!(log.buffer_sets, 2);
        assert_eq!(log.buffer_clears, 2);
        assert!(log.stops >= 2);
    }

    #[test]
    fn test_failed_load_leaves_no_session() {
        let (mut player, _log) = loaded_player(10_000);
        let result = player.load_file(Path::new("/nonexistent/file.wav"));
        assert!(result.is_err());
        assert!(!player.has_session());
        assert_eq!(player.state(), TransportState::Stopped);
        assert_eq!(player.position_ms(), 0);
    }
}
