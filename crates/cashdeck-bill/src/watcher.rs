//! Background polling loop delivering bill events over a channel.
//!
//! Mirrors the coin watcher: the loop owns the controller, repeats the
//! poll tick on a fixed cadence, filters out the canned no-news ticks, and
//! shuts down cooperatively when the stop flag is raised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use cashdeck_core::{BillTick, Error, Result};

use crate::controller::BillAcceptor;

/// Status code of the tick the watcher filters out.
const NO_NEWS: u16 = 302;

/// Handle to a running bill polling loop.
pub struct BillWatcher {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<BillAcceptor>,
}

/// Start polling `acceptor` every `interval`, delivering every tick that
/// carries news on the returned channel.
pub fn spawn_bill_watcher(
    mut acceptor: BillAcceptor,
    interval: Duration,
) -> (BillWatcher, mpsc::UnboundedReceiver<BillTick>) {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = thread::spawn(move || {
        while !flag.load(Ordering::Relaxed) {
            let tick = acceptor.get_bill();
            if tick.status_code != NO_NEWS && tx.send(tick).is_err() {
                debug!(target: "cashdeck::bill", "tick receiver dropped");
            }
            thread::sleep(interval);
        }
        acceptor
    });

    (BillWatcher { stop, handle }, rx)
}

impl BillWatcher {
    /// Request shutdown, wait for the loop to finish its current tick,
    /// and hand the controller back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WatcherStopped`] if the polling thread panicked.
    pub fn stop(self) -> Result<BillAcceptor> {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.join().map_err(|_| Error::WatcherStopped)
    }
}
