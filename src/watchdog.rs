//! Link Watchdog
//!
//! Polls the operator transport on a fixed period and keeps a single
//! "transport reachable" flag, logging every change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Anything that can tell whether operators can reach the bridge
pub trait LinkProbe: Send + Sync {
    fn is_reachable(&self) -> bool;
}

pub struct LinkWatchdog {
    probe: Arc<dyn LinkProbe>,
    period: Duration,
    reachable: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LinkWatchdog {
    pub fn new(probe: Arc<dyn LinkProbe>, period: Duration) -> Self {
        Self {
            probe,
            period,
            reachable: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Last polled reachability
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Start polling; false if already running
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return false;
        }

        let probe = self.probe.clone();
        let reachable = self.reachable.clone();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        *task = Some(tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let now = probe.is_reachable();
                let before = reachable.swap(now, Ordering::SeqCst);
                if now != before {
                    if now {
                        info!("[WATCHDOG] Operator link up");
                    } else {
                        warn!("[WATCHDOG] Operator link down");
                    }
                }
            }
        }));
        true
    }

    /// Stop polling; false if not running
    pub async fn stop(&self) -> bool {
        match self.task.lock().await.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}
