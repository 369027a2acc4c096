//! Background trimming of the disk tier
//!
//! Writes request a sweep; bursts of requests collapse into one sweep that
//! runs once no new request has arrived for the debounce window. A periodic
//! tick sweeps as well, so expired entries go away even on an idle cache.

use crate::error::Result;
use std::sync::Weak;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Something the scheduler can sweep
pub(crate) trait Sweep: Send + Sync + 'static {
    fn sweep(&self);
}

/// Handle to the trim thread; dropping it stops and joins the thread
pub(crate) struct TrimScheduler {
    requests: Option<mpsc::UnboundedSender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl TrimScheduler {
    /// Start the trim thread for the cache called `name`.
    ///
    /// The thread only holds `target` weakly and stops on its own once the
    /// target is gone.
    pub fn spawn<S: Sweep>(
        name: &str,
        target: Weak<S>,
        debounce: Duration,
        interval: Duration,
    ) -> Result<Self> {
        let (requests, mut receiver) = mpsc::unbounded_channel::<()>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let thread_name = format!("anycache-trim-{}", name);

        info!(
            "Starting trim scheduler '{}' (debounce: {:?}, interval: {:?})",
            thread_name, debounce, interval
        );

        let worker = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                runtime.block_on(async move {
                    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    // end of the current quiet window, if a sweep was requested
                    let mut quiet_until: Option<Instant> = None;

                    loop {
                        let quiet = sleep_until(quiet_until.unwrap_or_else(Instant::now));
                        tokio::select! {
                            request = receiver.recv() => {
                                if request.is_none() {
                                    break;
                                }
                                quiet_until = Some(Instant::now() + debounce);
                                continue;
                            }
                            _ = quiet, if quiet_until.is_some() => {
                                quiet_until = None;
                            }
                            _ = ticker.tick() => {}
                        }

                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        target.sweep();
                    }

                    debug!("Trim scheduler stopped");
                });
            })?;

        Ok(Self {
            requests: Some(requests),
            worker: Some(worker),
        })
    }

    /// Ask for a sweep after the next quiet window
    pub fn request(&self) {
        if let Some(requests) = &self.requests {
            // a closed channel means the thread has already stopped
            let _ = requests.send(());
        }
    }
}

impl Drop for TrimScheduler {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Trim thread panicked");
            }
        }
    }
}
