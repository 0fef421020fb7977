//! Once-per-second countdown timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const TICK: Duration = Duration::from_secs(1);

/// Starts countdowns. Must be called from within a tokio runtime.
pub struct TickSource;

impl TickSource {
    /// Count `seconds` down to zero.
    ///
    /// `on_tick` receives the new remaining value once per second; `on_done` runs exactly
    /// once after the value reaches zero. A zero-second countdown calls `on_done` on the
    /// next scheduling step without ticking.
    pub fn start<T, D>(seconds: u32, mut on_tick: T, on_done: D) -> TickHandle
    where
        T: FnMut(u32) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK, TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut remaining = seconds;
            while remaining > 0 {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                remaining -= 1;
                on_tick(remaining);
            }
            if !flag.swap(true, Ordering::SeqCst) {
                on_done();
            }
        });
        TickHandle { cancelled, task }
    }
}

/// Cancel control for one running countdown.
#[derive(Debug)]
pub struct TickHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TickHandle {
    /// Stop ticking. No callback starts after this returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl FnMut(u32) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |r| sink.lock().unwrap().push(r))
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_then_completes() {
        let (seen, on_tick) = recorder();
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        let _handle = TickSource::start(3, on_tick, move || {
            let _ = tx.send(());
        });

        rx.await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(*seen.lock().unwrap(), vec![2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_seconds_completes_without_ticking() {
        let (seen, on_tick) = recorder();
        let (tx, rx) = oneshot::channel();
        TickSource::start(0, on_tick, move || {
            let _ = tx.send(());
        });
        rx.await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_all_callbacks() {
        let (seen, on_tick) = recorder();
        let done = Arc::new(AtomicBool::new(false));
        let done_flag = Arc::clone(&done);
        let handle = TickSource::start(5, on_tick, move || {
            done_flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(*seen.lock().unwrap(), vec![4, 3]);
        assert!(!done.load(Ordering::SeqCst));
    }
}
