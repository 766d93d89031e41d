use crate::auth::Inner;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// The recurring expiry check. It runs while a credential exists and is aborted on sign-out and
/// when the manager is dropped.
#[derive(Debug, Default)]
pub(super) struct ExpiryWatch {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExpiryWatch {
    /// Starts the check unless it is already running.
    pub(super) fn start(&self, inner: &Arc<Inner>) {
        let Ok(mut handle) = self.handle.lock() else {
            return;
        };
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let weak = Arc::downgrade(inner);
        let period = inner.options.check_interval;
        debug!("Starting the expiry check every {period:?}");
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                trace!("Checking token expiry");
                if !inner.check_expiry().await {
                    debug!("No credential left, stopping the expiry check");
                    break;
                }
            }
        }));
    }

    pub(super) fn stop(&self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(h) = handle.take() {
                h.abort();
            }
        }
    }

    pub(super) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for ExpiryWatch {
    fn drop(&mut self) {
        self.stop();
    }
}
