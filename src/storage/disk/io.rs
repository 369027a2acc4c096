//! Serial background I/O queue of the disk tier
//!
//! A dedicated thread runs a current-thread tokio runtime and executes queued
//! operations one at a time, in submission order. Failures are logged and
//! swallowed; the manifest has already committed the logical change.

use crate::error::Result;
use crate::storage::disk::manifest::{sidecar_path, FileMetadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Callback run on the I/O thread once an operation is done
pub(crate) type Completion = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum IoOp {
    /// Write data bytes, then the sidecar
    Write {
        path: PathBuf,
        bytes: Arc<Vec<u8>>,
        metadata: FileMetadata,
        on_landed: Completion,
    },
    Read {
        path: PathBuf,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
    /// Delete a data file and its sidecar
    Remove { path: PathBuf },
    RemoveDir { path: PathBuf },
    /// Runs once everything queued before it has finished
    Barrier { done: Completion },
}

impl IoOp {
    async fn run(self) {
        match self {
            IoOp::Write {
                path,
                bytes,
                metadata,
                on_landed,
            } => {
                if let Err(e) = write_entry(&path, &bytes, &metadata).await {
                    warn!("Failed to persist cache file {}: {}", path.display(), e);
                }
                on_landed();
            }
            IoOp::Read { path, reply } => {
                let bytes = tokio::fs::read(&path).await.ok();
                let _ = reply.send(bytes);
            }
            IoOp::Remove { path } => {
                for target in [sidecar_path(&path), path] {
                    remove_file(&target).await;
                }
            }
            IoOp::RemoveDir { path } => match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => debug!("Removed cache directory {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove cache directory {}: {}", path.display(), e),
            },
            IoOp::Barrier { done } => done(),
        }
    }
}

async fn write_entry(path: &Path, bytes: &[u8], metadata: &FileMetadata) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;

    let sidecar = serde_json::to_vec(metadata)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(sidecar_path(path), sidecar).await
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete cache file {}: {}", path.display(), e),
    }
}

/// Handle to the I/O thread; dropping it drains the queue and joins the thread
pub(crate) struct IoQueue {
    sender: Option<mpsc::UnboundedSender<IoOp>>,
    worker: Option<JoinHandle<()>>,
}

impl IoQueue {
    /// Start the I/O thread for the cache called `name`
    pub fn spawn(name: &str) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<IoOp>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let worker = std::thread::Builder::new()
            .name(format!("anycache-io-{}", name))
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(op) = receiver.recv().await {
                        op.run().await;
                    }
                });
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn submit(&self, op: IoOp) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(op).is_ok());
        if !delivered {
            warn!("Cache I/O thread is gone; dropping queued operation");
        }
    }

    /// Block until every operation submitted so far has finished
    pub fn flush(&self) {
        let (tx, rx) = std::sync::mpsc::channel();
        self.submit(IoOp::Barrier {
            done: Box::new(move || {
                let _ = tx.send(());
            }),
        });
        // Err means the worker is gone, nothing left to wait for
        let _ = rx.recv();
    }
}

impl Drop for IoQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Cache I/O thread panicked");
            }
        }
    }
}
