use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the controller waits for a worker to acknowledge cancellation.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Cooperative stop signal for one analysis worker.
///
/// The transport controller holds the setter side, the worker polls
/// `is_signaled()` at its loop boundaries. The session id tags everything the
/// worker publishes, bounding its validity to one playback episode.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    session_id: u64,
}

impl CancellationToken {
    pub fn new(session_id: u64) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            session_id,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn signal(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Cheap read used by the worker at loop boundaries.
    pub fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

/// A spawned analysis worker plus the machinery for a bounded join.
///
/// The worker closure holds a `Sender` that disconnects when the closure
/// returns (including on unwind), so `cancel_and_join` can wait for exit with
/// a timeout instead of blocking indefinitely on `JoinHandle::join`.
pub struct WorkerHandle {
    token: CancellationToken,
    exited: Receiver<()>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn a worker thread wired for cooperative cancellation.
    ///
    /// The closure receives a clone of `token` and is expected to exit
    /// promptly once the token is signaled.
    pub fn spawn<F>(token: CancellationToken, work: F) -> Self
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let (exit_tx, exit_rx): (Sender<()>, Receiver<()>) = channel();
        let worker_token = token.clone();
        let thread = std::thread::spawn(move || {
            // Dropped when the closure returns, disconnecting the receiver.
            let _exit = exit_tx;
            work(worker_token);
        });
        Self {
            token,
            exited: exit_rx,
            thread,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.token.session_id()
    }

    /// Signal cancellation and wait up to `timeout` for the worker to exit.
    ///
    /// Returns true when the thread observably exited and was reaped. On
    /// false the worker is abandoned: it keeps its own clone of the token and
    /// buffer, and the caller must discard anything it still publishes.
    pub fn cancel_and_join(self, timeout: Duration) -> bool {
        self.token.signal();
        match self.exited.recv_timeout(timeout) {
            // The worker never sends; disconnection means the closure returned.
            Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                true
            }
            Ok(()) | Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("session_id", &self.session_id())
            .field("signaled", &self.token.is_signaled())
            .finish()
    }
}
