//! Reacting to writes made by other contexts sharing the same blob.
//!
//! There is no merge: the blob as last written wins and replaces in-memory state
//! wholesale. Producers of [`ExternalChange`] are the file watcher in production
//! and plain calls in tests.

use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::error::StoreResult;
use crate::snapshot::Snapshot;
use crate::store::{RemoteChange, StoreEvent, TaskStore};

/// Notice that the persisted blob may have been rewritten elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChange {
    pub source: String,
}

impl ExternalChange {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl<B: BlobStore> TaskStore<B> {
    /// Reloads the full state from the blob after an external write.
    ///
    /// Returns `None` when the blob already matches memory (an echo of this
    /// context's own save). A corrupt blob is reported and the prior state kept.
    #[tracing::instrument(skip(self), fields(source = %change.source))]
    pub fn apply_external_change(
        &mut self,
        change: &ExternalChange,
    ) -> StoreResult<Option<RemoteChange>> {
        let incoming = match self.read_snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => Snapshot::default(),
            Err(err) => {
                warn!(error = %err, "external blob unreadable; keeping current state");
                return Err(err);
            }
        };

        let current = self.snapshot();
        if incoming == current {
            debug!("external change already reflected in memory");
            return Ok(None);
        }

        let remote = RemoteChange::between(current.todos.len(), incoming.todos.len());
        self.replace_state(incoming);
        info!(
            kind = ?remote.kind,
            before = remote.before,
            after = remote.after,
            "reloaded state after external change"
        );
        self.emit(StoreEvent::RemoteChange(remote));
        Ok(Some(remote))
    }
}
