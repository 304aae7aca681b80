//! Background folder removal.
//!
//! `rmdir_async` hands the folder to a named worker thread that retries `rmdir` a
//! bounded number of times. Outcomes are not delivered on the worker: the success or
//! failure callback is posted to a `CompletionQueue`, which the primary thread drains
//! whenever it chooses (`run_pending` / `run_next`).
//!
//! State: Pending -> Retrying(n) -> Done | GaveUp.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::StorageExecutor;

/// Work posted back to the primary thread.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Channel of callbacks the primary thread runs.
pub struct CompletionQueue {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    fn sender(&self) -> Sender<Completion> {
        self.tx.clone()
    }

    /// Run every callback queued so far, without waiting. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut n = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            n += 1;
        }
        n
    }

    /// Wait up to `timeout` for one callback and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimState {
    Pending,
    /// Attempt number currently running (1-based).
    Retrying(u32),
    Done,
    GaveUp,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(100),
        }
    }
}

/// Handle to a running reclaim.
#[derive(Debug)]
pub struct ReclaimHandle {
    state: Arc<Mutex<ReclaimState>>,
    join: JoinHandle<()>,
}

impl ReclaimHandle {
    /// Current state, readable while the worker is still running.
    pub fn state(&self) -> ReclaimState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ReclaimState::GaveUp)
    }

    /// Wait for the worker and return its final state.
    pub fn join(self) -> ReclaimState {
        let state = Arc::clone(&self.state);
        if self.join.join().is_err() {
            warn!("Reclaim worker panicked");
        }
        state.lock().map(|s| *s).unwrap_or(ReclaimState::GaveUp)
    }
}

fn set_state(state: &Mutex<ReclaimState>, next: ReclaimState) {
    if let Ok(mut s) = state.lock() {
        *s = next;
    }
}

/// Remove `folder` in the background. `on_done` or `on_failure` is posted to
/// `queue` once the worker finishes.
pub fn rmdir_async<S, F>(
    storage: Arc<StorageExecutor>,
    folder: PathBuf,
    queue: &CompletionQueue,
    policy: RetryPolicy,
    on_done: S,
    on_failure: F,
) -> std::io::Result<ReclaimHandle>
where
    S: FnOnce() + Send + 'static,
    F: FnOnce(&Path) + Send + 'static,
{
    let state = Arc::new(Mutex::new(ReclaimState::Pending));
    let worker_state = Arc::clone(&state);
    let tx = queue.sender();
    let name = format!(
        "eyepair-reclaim-{}",
        folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );

    let join = thread::Builder::new().name(name).spawn(move || {
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            set_state(&worker_state, ReclaimState::Retrying(attempt));
            if storage.rmdir(&folder) {
                set_state(&worker_state, ReclaimState::Done);
                info!(folder = %folder.display(), attempt, "Folder reclaimed");
                if tx.send(Box::new(on_done)).is_err() {
                    debug!("Completion queue dropped before success was delivered");
                }
                return;
            }
            if attempt < attempts {
                thread::sleep(policy.interval);
            }
        }
        set_state(&worker_state, ReclaimState::GaveUp);
        warn!(folder = %folder.display(), attempts, "Giving up on folder removal");
        let report: Completion = Box::new(move || on_failure(&folder));
        if tx.send(report).is_err() {
            debug!("Completion queue dropped before failure was delivered");
        }
    })?;

    Ok(ReclaimHandle { state, join })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageContext;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn empty_folder_is_reclaimed_and_callback_runs_on_caller() {
        let td = tempdir().unwrap();
        let d = td.path().join("old");
        fs::create_dir(&d).unwrap();
        let storage = Arc::new(StorageExecutor::new(StorageContext::new()));
        let queue = CompletionQueue::new();
        let caller = thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let ran_on2 = Arc::clone(&ran_on);

        let handle = rmdir_async(
            storage,
            d.clone(),
            &queue,
            quick(),
            move || {
                *ran_on2.lock().unwrap() = Some(thread::current().id());
            },
            |_| panic!("should not fail"),
        )
        .unwrap();

        assert_eq!(handle.join(), ReclaimState::Done);
        assert!(!d.exists());
        // nothing runs until the caller drains the queue
        assert!(ran_on.lock().unwrap().is_none());
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(*ran_on.lock().unwrap(), Some(caller));
    }

    #[test]
    fn non_empty_folder_gives_up() {
        let td = tempdir().unwrap();
        let d = td.path().join("busy");
        fs::create_dir(&d).unwrap();
        fs::write(d.join("x.jpg"), b"x").unwrap();
        let storage = Arc::new(StorageExecutor::new(StorageContext::new()));
        let queue = CompletionQueue::new();
        let failed = Arc::new(AtomicBool::new(false));
        let failed2 = Arc::clone(&failed);

        let handle = rmdir_async(
            storage,
            d.clone(),
            &queue,
            quick(),
            || panic!("should not succeed"),
            move |_| failed2.store(true, Ordering::SeqCst),
        )
        .unwrap();

        assert!(queue.run_next(Duration::from_secs(5)));
        assert!(failed.load(Ordering::SeqCst));
        assert_eq!(handle.join(), ReclaimState::GaveUp);
        assert!(d.join("x.jpg").exists());
    }
}
