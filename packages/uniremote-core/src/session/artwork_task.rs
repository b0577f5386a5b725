//! Single-slot marker for the outstanding bulk artwork fetch.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::artwork::ArtworkKind;

/// Records which bulk artwork fetch, if any, is outstanding.
///
/// Shared between the session manager (which starts fetches) and the
/// dispatcher (which accepts or discards bulk replies). Cancelling is local
/// bookkeeping only; the companion may still answer.
#[derive(Debug, Clone, Default)]
pub struct ArtworkTaskSlot {
    current: Arc<Mutex<Option<ArtworkKind>>>,
}

impl ArtworkTaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a bulk fetch of `kind` as outstanding, replacing any previous one.
    pub fn begin(&self, kind: ArtworkKind) {
        let previous = self.current.lock().replace(kind);
        if let Some(previous) = previous {
            log::debug!("[Session] Replacing outstanding {} artwork task", previous);
        }
    }

    /// Clears the marker. Idempotent.
    pub fn cancel(&self) {
        self.current.lock().take();
    }

    pub fn current(&self) -> Option<ArtworkKind> {
        *self.current.lock()
    }

    /// Clears the marker if it equals `kind`. Returns whether it did.
    pub fn complete_if(&self, kind: ArtworkKind) -> bool {
        let mut current = self.current.lock();
        if *current == Some(kind) {
            *current = None;
            true
        } else {
            false
        }
    }
}
