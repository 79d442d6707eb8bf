//! File watcher for the persisted blob.
//!
//! Watches the data directory (the blob is replaced by rename, so the file itself
//! cannot be watched), debounces bursts, and forwards an [`ExternalChange`] for
//! every batch touching the blob file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc::UnboundedSender;

use crate::sync::ExternalChange;

const DEBOUNCE_DURATION_MS: u64 = 200;

pub struct BlobWatcher {
    debouncer: Debouncer<RecommendedWatcher>,
    watched_dir: PathBuf,
}

impl BlobWatcher {
    /// Starts watching `blob_path` and sends changes on `tx` until dropped.
    pub fn spawn(
        blob_path: &Path,
        tx: UnboundedSender<ExternalChange>,
    ) -> Result<Self, notify::Error> {
        let watched_dir = blob_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| notify::Error::generic("blob path has no parent directory"))?;
        let blob_name = blob_path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| notify::Error::generic("blob path has no file name"))?;

        let debouncer = new_debouncer(
            Duration::from_millis(DEBOUNCE_DURATION_MS),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let touched = events
                        .iter()
                        .any(|event| event.path.file_name() == Some(blob_name.as_os_str()));
                    if !touched {
                        return;
                    }
                    let source = blob_name.to_string_lossy().to_string();
                    if tx.send(ExternalChange::new(source)).is_err() {
                        tracing::debug!(
                            target: "protask::watcher",
                            "change receiver dropped; ignoring event"
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(
                        target: "protask::watcher",
                        error = %err,
                        "watcher error"
                    );
                }
            },
        )?;

        let mut watcher = Self {
            debouncer,
            watched_dir,
        };
        watcher
            .debouncer
            .watcher()
            .watch(&watcher.watched_dir, RecursiveMode::NonRecursive)?;

        tracing::info!(
            target: "protask::watcher",
            path = %watcher.watched_dir.display(),
            "blob watcher started"
        );

        Ok(watcher)
    }

    pub fn stop(&mut self) -> Result<(), notify::Error> {
        self.debouncer.watcher().unwatch(&self.watched_dir)
    }
}
