//! Filesystem change streams backed by `notify`

use baokit_core::{Error, Result};
use futures::Stream;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// The kind of change observed on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
    Other,
}

/// One filesystem change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Whether the change wrote new content to the path
    pub fn is_write_or_create(&self) -> bool {
        matches!(self.kind, ChangeKind::Write | ChangeKind::Create)
    }
}

/// A stream of change events; watcher errors are delivered in-band
pub type ChangeStream = Pin<Box<dyn Stream<Item = Result<ChangeEvent>> + Send>>;

/// Keeps a directory watch alive. Dropping it ends the associated stream.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    directory: PathBuf,
}

impl DirectoryWatcher {
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("directory", &self.directory)
            .finish()
    }
}

/// Watch a single directory (non-recursively) and stream its changes
pub fn watch_directory(directory: &Path) -> Result<(DirectoryWatcher, ChangeStream)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let kind = classify(&event.kind);
                for path in event.paths {
                    // Receiver gone means the consumer stopped listening
                    let _ = tx.send(Ok(ChangeEvent::new(path, kind)));
                }
            }
            Err(e) => {
                let _ = tx.send(Err(Error::unsupported("file watch", e.to_string())));
            }
        }
    })
    .map_err(|e| Error::configuration(format!("failed to create file watcher: {e}")))?;

    watcher
        .watch(directory, RecursiveMode::NonRecursive)
        .map_err(|e| {
            Error::configuration(format!(
                "failed to watch directory '{}': {e}",
                directory.display()
            ))
        })?;

    tracing::debug!(directory = %directory.display(), "watching directory for changes");

    let stream: ChangeStream = Box::pin(UnboundedReceiverStream::new(rx));
    Ok((
        DirectoryWatcher {
            _watcher: watcher,
            directory: directory.to_path_buf(),
        },
        stream,
    ))
}

fn classify(kind: &EventKind) -> ChangeKind {
    match kind {
        EventKind::Create(_) => ChangeKind::Create,
        // A rename landing on a path is how atomic swaps show up
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            ChangeKind::Create
        }
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
        EventKind::Modify(_) => ChangeKind::Write,
        EventKind::Remove(_) => ChangeKind::Remove,
        _ => ChangeKind::Other,
    }
}
