//! Named background threads with cooperative shutdown and bounded join
//!
//! Each worker owns a stop flag it polls between iterations. Shutdown sets the
//! flag and waits up to a timeout for the thread to exit; a thread that does
//! not finish in time is detached with a warning rather than blocking the
//! caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct WorkerHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
    stop: Arc<AtomicBool>,
}

/// Spawn a named worker; `body` receives the stop flag it must poll
pub fn spawn_worker<F>(name: &str, body: F) -> std::io::Result<WorkerHandle>
where
    F: FnOnce(Arc<AtomicBool>) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let (done_tx, done_rx) = mpsc::channel();

    let thread_stop = Arc::clone(&stop);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            // Dropped when the body returns or unwinds
            let _done: mpsc::Sender<()> = done_tx;
            body(thread_stop);
        })?;

    Ok(WorkerHandle {
        name: name.to_string(),
        handle: Some(handle),
        done_rx,
        stop,
    })
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal stop and wait up to `timeout`; returns false if the thread was abandoned
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);

        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("[{}] Worker thread panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "[{}] Worker did not stop within {:?}; detaching thread",
                    self.name,
                    timeout
                );
                false
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_cooperative_shutdown_joins() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let worker_ticks = Arc::clone(&ticks);
        let worker = spawn_worker("test-worker", move |stop| {
            while !stop.load(Ordering::Relaxed) {
                worker_ticks.fetch_add(1, Ordering::Relaxed);
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();

        assert_eq!(worker.name(), "test-worker");
        thread::sleep(Duration::from_millis(20));
        assert!(!worker.is_finished());
        assert!(worker.shutdown(Duration::from_secs(2)));
        assert!(ticks.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_unresponsive_worker_is_abandoned() {
        let worker = spawn_worker("stuck-worker", |_stop| {
            thread::sleep(Duration::from_millis(500));
        })
        .unwrap();

        let started = Instant::now();
        assert!(!worker.shutdown(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_self_terminating_worker() {
        let worker = spawn_worker("short-worker", |_stop| {}).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(worker.is_finished());
        assert!(worker.shutdown(Duration::from_millis(10)));
    }
}
