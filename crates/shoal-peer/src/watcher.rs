//! Share-directory watcher.
//!
//! Watches the top level of the share directory and emits exactly two event
//! kinds: a file appeared (publish it) and a file disappeared (unpublish
//! it). Modifications to an already-published file are not catalog changes
//! and are filtered out.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Catalog-relevant change in the share directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEvent {
    pub filename: String,
    pub kind: ShareEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareEventKind {
    /// File became available locally.
    Added,
    /// File became unavailable locally.
    Removed,
}

/// Filenames already announced, used to tell additions apart from
/// modifications (the debouncer reports both the same way).
type KnownFiles = Arc<Mutex<HashSet<String>>>;

/// Watcher over one share directory.
pub struct ShareWatcher {
    share_dir: PathBuf,
    /// Debouncer handle (must keep alive)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<ShareEvent>,
}

impl ShareWatcher {
    /// Watch the top level of `share_dir`, with a 200ms debounce period.
    ///
    /// `initial` seeds the known set so files present at startup (already
    /// announced via `auth`) do not re-announce themselves.
    pub fn new(share_dir: PathBuf, initial: impl IntoIterator<Item = String>) -> Result<Self> {
        // Canonicalize to resolve symlinks; on macOS /var/folders/... is
        // really /private/var/folders/... and FSEvents needs the real path.
        let share_dir = share_dir.canonicalize().unwrap_or(share_dir);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let known: KnownFiles = Arc::new(Mutex::new(initial.into_iter().collect()));

        let dir = share_dir.clone();
        let known_cb = Arc::clone(&known);
        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(share_event) = Self::process_event(&event, &dir, &known_cb) {
                            if event_tx.send(share_event).is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Share watcher error: {}", e);
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&share_dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            share_dir,
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Turn one debounced event into a catalog change, if it is one.
    fn process_event(
        event: &DebouncedEvent,
        share_dir: &Path,
        known: &KnownFiles,
    ) -> Option<ShareEvent> {
        let path = &event.path;

        let relative = path.strip_prefix(share_dir).ok()?;
        let filename = relative.to_str()?;

        // Top level only, and no hidden files.
        if filename.is_empty() || filename.contains('/') || filename.starts_with('.') {
            return None;
        }

        let mut known = known.lock().expect("known files mutex poisoned");
        let change = if path.is_file() {
            // A newly seen file is an addition; a rewrite of a known one is
            // not a catalog change.
            known.insert(filename.to_string()).then(|| ShareEvent {
                filename: filename.to_string(),
                kind: ShareEventKind::Added,
            })
        } else if !path.exists() {
            known.remove(filename).then(|| ShareEvent {
                filename: filename.to_string(),
                kind: ShareEventKind::Removed,
            })
        } else {
            // Directories never enter the catalog.
            None
        };

        if let Some(ref change) = change {
            debug!("Share event: {:?} - {}", change.kind, change.filename);
        }
        change
    }

    /// Get the receiver for share events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<ShareEvent> {
        &mut self.event_rx
    }

    /// Get the watched directory.
    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }
}
