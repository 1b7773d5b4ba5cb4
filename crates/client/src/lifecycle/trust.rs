//! CA certificate reload on file change

use super::manager::ManagerInner;
use baokit_core::{Result, ATOMIC_SWAP_MARKER};
use baokit_utils::{watch_directory, ChangeEvent, ChangeStream, DirectoryWatcher};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A running trust-root watch; dropping it stops the watch
pub(crate) struct TrustRootWatch {
    _watcher: Option<DirectoryWatcher>,
    task: JoinHandle<()>,
}

impl TrustRootWatch {
    /// Consume an already-open change stream
    pub(crate) fn from_stream(
        inner: Arc<ManagerInner>,
        ca_cert: PathBuf,
        stream: ChangeStream,
    ) -> Self {
        Self {
            _watcher: None,
            task: tokio::spawn(consume(inner, ca_cert, stream)),
        }
    }
}

impl Drop for TrustRootWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the directory holding `ca_cert` and reload trust roots when it changes
pub(crate) fn start(inner: Arc<ManagerInner>, ca_cert: &Path) -> Result<TrustRootWatch> {
    let directory = match ca_cert.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (watcher, stream) = watch_directory(&directory)?;

    let mut watch = TrustRootWatch::from_stream(inner, ca_cert.to_path_buf(), stream);
    watch._watcher = Some(watcher);
    Ok(watch)
}

/// Whether a change in the watched directory replaced the certificate.
///
/// Mounted secrets and config maps swap their content through a `..data` symlink,
/// so changes to it count as certificate changes.
pub(crate) fn is_trust_root_change(event: &ChangeEvent, ca_cert: &Path) -> bool {
    if !event.is_write_or_create() {
        return false;
    }
    match event.path.file_name() {
        Some(name) => name == ATOMIC_SWAP_MARKER || Some(name) == ca_cert.file_name(),
        None => false,
    }
}

async fn consume(inner: Arc<ManagerInner>, ca_cert: PathBuf, mut stream: ChangeStream) {
    while let Some(event) = stream.next().await {
        if inner.is_closed() {
            break;
        }
        match event {
            Ok(event) if is_trust_root_change(&event, &ca_cert) => {
                match inner.client.reload_trust_roots() {
                    Ok(()) => info!(path = %ca_cert.display(), "CA certificate reloaded"),
                    Err(e) => error!(error = %e, "failed to reload vault config"),
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "watcher error"),
        }
    }
    debug!("trust root watch stopped");
}
