//! Background run execution and the machine-wide input lease.
//!
//! Mouse and keyboard are a single shared resource: two runs injecting
//! input at once would interleave their clicks and keystrokes. The lease is
//! a one-slot semaphore that a run holds from spawn until its worker thread
//! fully stops driving input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::step::{ProgressEvent, RunReport, StepStatus, WorkflowStep};
use crate::error::{AutomationError, Result};
use crate::exec::CancelToken;

/// One-slot input semaphore. Cloning shares the slot.
#[derive(Clone, Default)]
pub struct InputLease(Arc<AtomicBool>);

impl InputLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot, or fails with `ResourceBusy` if a run already holds
    /// it. The returned guard releases the slot on drop.
    pub fn acquire(&self) -> Result<LeaseGuard> {
        if self
            .0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(LeaseGuard(self.0.clone()))
        } else {
            Err(AutomationError::ResourceBusy)
        }
    }
}

pub struct LeaseGuard(Arc<AtomicBool>);

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a run executing on a worker thread.
pub struct RunHandle {
    thread: JoinHandle<RunReport>,
    pub progress: Receiver<ProgressEvent>,
    cancel: CancelToken,
}

impl RunHandle {
    /// Requests cooperative cancellation; the run stops at its next tick.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the run to finish and returns its report. A panicked
    /// worker is reported as a failed run rather than propagated.
    pub fn join(self) -> RunReport {
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => {
                crate::log("Run worker panicked");
                RunReport {
                    steps: vec![WorkflowStep {
                        name: "worker".into(),
                        status: StepStatus::Failed,
                        detail: "worker thread panicked".into(),
                        duration: Duration::ZERO,
                    }],
                    success: false,
                }
            }
        }
    }
}

/// Spawns `run` on a worker thread under the input lease.
///
/// The lease is acquired before the thread starts and released when the
/// worker returns, so a second spawn while a run is in flight fails fast
/// with `ResourceBusy` instead of queueing.
pub fn spawn_run<F>(lease: &InputLease, run: F) -> Result<RunHandle>
where
    F: FnOnce(Sender<ProgressEvent>, CancelToken) -> RunReport + Send + 'static,
{
    let guard = lease.acquire()?;
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let (tx, rx) = mpsc::channel();

    let thread = std::thread::spawn(move || {
        let report = run(tx, worker_cancel);
        // Input stops when `run` returns; only then may another run start.
        drop(guard);
        report
    });

    Ok(RunHandle {
        thread,
        progress: rx,
        cancel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn instant_report(success: bool) -> RunReport {
        RunReport {
            steps: Vec::new(),
            success,
        }
    }

    #[test]
    fn test_lease_is_exclusive() {
        let lease = InputLease::new();
        let guard = lease.acquire().unwrap();
        assert!(matches!(
            lease.acquire(),
            Err(AutomationError::ResourceBusy)
        ));
        drop(guard);
        assert!(lease.acquire().is_ok());
    }

    #[test]
    fn test_second_spawn_fails_while_run_in_flight() {
        let lease = InputLease::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let handle = spawn_run(&lease, move |_, _| {
            let _ = release_rx.recv();
            instant_report(true)
        })
        .unwrap();

        let second = spawn_run(&lease, |_, _| instant_report(true));
        assert!(matches!(second, Err(AutomationError::ResourceBusy)));

        release_tx.send(()).unwrap();
        assert!(handle.join().success);

        // Lease is free again once the first run finished.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match spawn_run(&lease, |_, _| instant_report(true)) {
                Ok(third) => {
                    assert!(third.join().success);
                    break;
                }
                Err(AutomationError::ResourceBusy) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn test_cancellation_reaches_the_worker() {
        let lease = InputLease::new();
        let handle = spawn_run(&lease, |_, cancel| {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !cancel.is_cancelled() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            instant_report(cancel.is_cancelled())
        })
        .unwrap();

        handle.cancel();
        let report = handle.join();
        assert!(report.success, "worker never observed cancellation");
    }

    #[test]
    fn test_progress_channel_delivers_events() {
        let lease = InputLease::new();
        let handle = spawn_run(&lease, |progress, _| {
            let step = WorkflowStep::running("launch");
            let _ = progress.send(ProgressEvent { step });
            instant_report(true)
        })
        .unwrap();

        let event = handle
            .progress
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(event.step.name, "launch");
        assert!(handle.join().success);
    }
}
