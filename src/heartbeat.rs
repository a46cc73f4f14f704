//! Periodic `SSH_MSG_IGNORE` heartbeat, keeping idle connections from being
//! dropped by intermediate NATs and load balancers.

use std::{sync::Arc, time::Duration};

use ssh_packet::trans::Ignore;

use crate::session::Writer;

/// Drives a `tokio::time::interval` loop sending an empty `SSH_MSG_IGNORE`
/// through the ordinary write path (so it's gated by kex like any other
/// message). Dropping the handle stops the task.
pub(crate) struct Heartbeater {
    handle: tokio::task::JoinHandle<()>,
}

impl Heartbeater {
    /// Spawn the heartbeat task, or return `None` if `interval` is zero
    /// (heartbeating disabled).
    pub(crate) fn spawn(writer: Arc<Writer>, interval: Duration) -> Option<Self> {
        if interval.is_zero() {
            return None;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately, skip it

            loop {
                ticker.tick().await;

                if writer.write(Ignore { data: Vec::new().into() }).await.is_err() {
                    break;
                }
            }
        });

        Some(Self { handle })
    }
}

impl Drop for Heartbeater {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
