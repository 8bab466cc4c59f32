//! Eviction thread
//!
//! A single background thread started at setup. Each tick it checks whether
//! admitting one more chunk would exceed capacity and, if so, evicts the
//! chunk at the recency tail. It is a steady-state trimmer, not a synchronous
//! back-pressure mechanism: readers that hit a full cache take a soft miss
//! and never wait on it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::cache::CacheInner;

pub(crate) struct Evictor {
    handle: JoinHandle<()>,
    shutdown_tx: Sender<()>,
}

impl Evictor {
    pub(crate) fn spawn(inner: Arc<CacheInner>) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let handle = std::thread::spawn(move || {
            debug!("eviction thread started");
            loop {
                match shutdown_rx.recv_timeout(inner.evict_interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    // Shutdown message, or the cache dropped its sender.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if inner.exiting.load(Ordering::Relaxed) {
                    break;
                }
                if inner.over_capacity() && inner.evict_one() {
                    trace!("eviction tick freed one chunk");
                }
            }
            debug!("eviction thread exiting");
        });
        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Wake the thread out of its sleep and wait for it to finish.
    pub(crate) fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.join();
    }
}
