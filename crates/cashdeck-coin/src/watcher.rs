//! Background polling loop delivering coin events over a channel.
//!
//! The loop owns the controller for its lifetime and merely repeats the
//! normal poll-tick operation on a fixed cadence, filtering out the
//! "no news" ticks before delivery. Cancellation is cooperative: the stop
//! flag is observed within one interval, the loop releases the channel,
//! and [`CoinWatcher::stop`] joins the thread before handing the
//! controller back for reuse.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use cashdeck_core::{CoinTick, Error, Result};

use crate::controller::CoinAcceptor;

/// Status code of the tick the watcher filters out.
const NO_NEWS: u16 = 303;

/// Handle to a running coin polling loop.
pub struct CoinWatcher {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<CoinAcceptor>,
}

/// Start polling `acceptor` every `interval`, delivering every tick that
/// carries news on the returned channel.
///
/// The receiver end is a tokio channel so async callers can await ticks;
/// the loop itself runs on a dedicated thread because the driver blocks
/// on serial I/O.
pub fn spawn_coin_watcher(
    mut acceptor: CoinAcceptor,
    interval: Duration,
) -> (CoinWatcher, mpsc::UnboundedReceiver<CoinTick>) {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = thread::spawn(move || {
        while !flag.load(Ordering::Relaxed) {
            let tick = acceptor.get_coin();
            if tick.status_code != NO_NEWS && tx.send(tick).is_err() {
                // Receiver dropped; keep observing the stop flag so the
                // owner can still join and recover the controller.
                debug!(target: "cashdeck::coin", "tick receiver dropped");
            }
            thread::sleep(interval);
        }
        acceptor
    });

    (CoinWatcher { stop, handle }, rx)
}

impl CoinWatcher {
    /// Request shutdown, wait for the loop to finish its current tick,
    /// and hand the controller back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WatcherStopped`] if the polling thread panicked.
    pub fn stop(self) -> Result<CoinAcceptor> {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.join().map_err(|_| Error::WatcherStopped)
    }
}
