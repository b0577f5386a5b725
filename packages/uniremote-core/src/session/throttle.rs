//! Throttled single-item artwork requests.
//!
//! Requests are queued and drained by one worker, spaced by a fixed interval.
//! A request already waiting in the queue is not queued twice.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol::Command;

pub(crate) struct ArtworkRequestThrottle {
    tx: mpsc::UnboundedSender<Command>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    queued: Arc<DashSet<Command>>,
    interval: Duration,
}

impl ArtworkRequestThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            queued: Arc::new(DashSet::new()),
            interval,
        }
    }

    /// Queues `command`. Returns false if it is already waiting.
    pub(crate) fn request(&self, command: Command) -> bool {
        if !self.queued.insert(command.clone()) {
            return false;
        }
        if self.tx.send(command.clone()).is_err() {
            self.queued.remove(&command);
            return false;
        }
        true
    }

    /// Hands the queue to the worker. Returns `None` after the first call.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Command>> {
        self.rx.lock().take()
    }

    /// Marks `command` as dequeued so it can be requested again.
    pub(crate) fn dequeued(&self, command: &Command) {
        self.queued.remove(command);
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.queued.len()
    }
}
