//! Periodic keepalive ping for an open session.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, warn};

use super::session::{Outbound, SessionState};

/// Owns the ping task. Dropping the timer cancels it.
///
/// Every live timer is counted in a shared gauge so callers can check that a
/// session never holds more than one.
pub(crate) struct KeepAliveTimer {
    task: JoinHandle<()>,
    live: Arc<AtomicUsize>,
}

impl KeepAliveTimer {
    pub(crate) fn start(
        outbound_tx: mpsc::UnboundedSender<Outbound>,
        state_rx: watch::Receiver<SessionState>,
        interval: Duration,
        live: Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        let task = tokio::spawn(run_ping_loop(outbound_tx, state_rx, interval));
        Self { task, live }
    }
}

impl Drop for KeepAliveTimer {
    fn drop(&mut self) {
        self.task.abort();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_ping_loop(
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    state_rx: watch::Receiver<SessionState>,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if *state_rx.borrow() != SessionState::Open {
            continue;
        }
        // Teardown belongs to the transport's close/error path, not to us.
        if outbound_tx.send(Outbound::Ping).is_err() {
            warn!("Realtime keepalive ping not queued: connection task is gone");
        } else {
            debug!("Realtime keepalive ping queued");
        }
    }
}
