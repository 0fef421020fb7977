//! Single-resolution playback handles.
//!
//! Every play request yields a [`Playback`]: a [`Completion`] that resolves exactly once,
//! and a clonable [`StopHandle`]. Stopping is idempotent and always resolves the completion,
//! even when it happens before the audio would have ended on its own.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

type StopHook = Box<dyn FnOnce() + Send>;

struct Shared {
    done: watch::Sender<bool>,
    on_stop: Mutex<Option<StopHook>>,
}

/// Handle returned by [`AudioOutput::play`](crate::output::AudioOutput::play).
pub struct Playback {
    pub completion: Completion,
    pub stop: StopHandle,
}

impl Playback {
    /// New in-flight playback. `on_stop` runs at most once, on the first explicit stop.
    pub fn new(on_stop: impl FnOnce() + Send + 'static) -> Self {
        let (done, rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            done,
            on_stop: Mutex::new(Some(Box::new(on_stop))),
        });
        Self {
            completion: Completion { rx },
            stop: StopHandle { shared },
        }
    }

    pub fn into_parts(self) -> (Completion, StopHandle) {
        (self.completion, self.stop)
    }
}

/// Resolves once playback ends or is stopped.
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub async fn wait(mut self) {
        // A dropped sender means the backend is gone; treat it as finished.
        let _ = self.rx.wait_for(|done| *done).await;
    }
}

/// Idempotent stop control for one playback.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stop now. Runs the backend hook on the first call only.
    pub fn stop(&self) {
        let hook = self
            .shared
            .on_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
        self.shared.done.send_replace(true);
    }

    /// Natural end of playback. Drops the stop hook without running it.
    pub fn mark_finished(&self) {
        self.shared
            .on_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shared.done.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        *self.shared.done.borrow()
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
