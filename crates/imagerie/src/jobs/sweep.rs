//! Periodic reconciliation sweep.
//!
//! Runs [`JobTracker::sweep`] on a background thread, on a fixed interval
//! and whenever a manual trigger arrives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use super::tracker::{JobTracker, SweepReport};

pub struct ReconcileScheduler {
    tracker: Arc<JobTracker>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    sweeps: Arc<AtomicUsize>,
    last_report: Arc<Mutex<Option<SweepReport>>>,
}

impl ReconcileScheduler {
    pub fn new(tracker: Arc<JobTracker>, interval: Duration) -> Self {
        Self {
            tracker,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            sweeps: Arc::new(AtomicUsize::new(0)),
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the sweep loop in a background thread.
    /// Accepts a trigger receiver for manual sweep requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let tracker = Arc::clone(&self.tracker);
        let shutdown = Arc::clone(&self.shutdown);
        let sweeps = Arc::clone(&self.sweeps);
        let last_report = Arc::clone(&self.last_report);
        let interval = self.interval;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start reconcile scheduler runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual reconcile sweep triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    match tracker.sweep(Utc::now()) {
                        Ok(report) => {
                            if let Ok(mut slot) = last_report.lock() {
                                *slot = Some(report);
                            }
                        }
                        Err(e) => log::error!("Reconcile sweep failed: {}", e),
                    }
                    sweeps.fetch_add(1, Ordering::AcqRel);
                }
            });
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Number of sweeps attempted so far.
    pub fn sweep_count(&self) -> usize {
        self.sweeps.load(Ordering::Acquire)
    }

    pub fn last_report(&self) -> Option<SweepReport> {
        self.last_report.lock().ok().and_then(|r| r.clone())
    }
}
