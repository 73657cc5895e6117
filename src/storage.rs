// SPDX-License-Identifier: MIT

//! File persistence for uploaded parts.
//!
//! [`StorageWriter`] is the seam between the parser and the disk. The parser
//! only ever hands it fully resolved paths (see [`resolve_storage_path`]) and
//! runs the writes of one request through a [`WriteGroup`], which fans them
//! out to worker threads, waits with a deadline and cancels the stragglers on
//! the first failure.

use crate::error::AppError;
use log::{debug, error, info, trace, warn};
use std::fs::{self, File};
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Bytes written between two cancellation checks
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

const MAX_FILENAME_LEN: usize = 255;

/// Shared flag telling in-flight writes to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Persists one file's bytes at a path.
///
/// Writes replace any existing file and are not atomic. Implementations
/// should return early with [`io::ErrorKind::Interrupted`] once `cancel` is
/// set; whatever was already written may stay behind.
pub trait StorageWriter: Send + Sync {
    fn write(&self, path: &Path, data: &[u8], cancel: &CancelToken) -> io::Result<()>;
}

/// Writes straight to the local filesystem in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct FsStorage {
    chunk_size: usize,
}

impl FsStorage {
    pub fn new() -> Self {
        Self::with_chunk_size(WRITE_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageWriter for FsStorage {
    fn write(&self, path: &Path, data: &[u8], cancel: &CancelToken) -> io::Result<()> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let mut file = File::create(path)?;
        for chunk in data.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                debug!("Write to {path:?} cancelled");
                return Err(cancelled());
            }
            file.write_all(chunk)?;
        }
        file.flush()?;
        trace!("Wrote {} bytes to {path:?}", data.len());
        Ok(())
    }
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "write cancelled")
}

/// Maps a client supplied filename to a path directly inside `root`.
///
/// Rejects empty or oversized names, names made only of dots, names with
/// path separators or control characters, and anything that is not a single
/// plain path component.
pub fn resolve_storage_path(root: &Path, filename: &str) -> Result<PathBuf, AppError> {
    if filename.is_empty() || filename.len() > MAX_FILENAME_LEN {
        return Err(AppError::invalid_filename(filename));
    }

    if filename.chars().all(|c| c == '.') {
        return Err(AppError::invalid_filename(filename));
    }

    if filename.contains(['/', '\\']) || filename.chars().any(char::is_control) {
        return Err(AppError::invalid_filename(filename));
    }

    let relative = Path::new(filename);
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(root.join(relative)),
        _ => Err(AppError::invalid_filename(filename)),
    }
}

/// Ensure the storage directory exists and accepts new files
pub fn ensure_storage_dir(dir: &Path) -> Result<(), AppError> {
    if !dir.exists() {
        info!("Creating storage directory: {dir:?}");
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create storage directory {dir:?}: {e}");
            AppError::from(e)
        })?;
    } else if !dir.is_dir() {
        return Err(AppError::InvalidConfiguration(format!(
            "Storage path {dir:?} exists but is not a directory"
        )));
    }

    let probe = dir.join(".formdrop_write_test");
    match File::create(&probe) {
        Ok(_) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => {
            error!("Storage directory {dir:?} is not writable: {e}");
            Err(AppError::from(e))
        }
    }
}

/// One file to persist: a slice of the shared request buffer and its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteJob {
    pub path: PathBuf,
    pub range: Range<usize>,
}

/// Runs the writes of one request concurrently.
pub struct WriteGroup {
    storage: Arc<dyn StorageWriter>,
    timeout: Duration,
}

impl WriteGroup {
    pub fn new(storage: Arc<dyn StorageWriter>, timeout: Duration) -> Self {
        Self { storage, timeout }
    }

    /// Write every job, one thread per job, and wait for all of them.
    ///
    /// Returns on the first failure or when the timeout elapses; in both
    /// cases the remaining writes are cancelled. Workers are not joined after
    /// that point, they observe the token and exit on their own.
    pub fn run(&self, buffer: Arc<Vec<u8>>, jobs: Vec<WriteJob>) -> Result<(), AppError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel::<(PathBuf, io::Result<()>)>();
        let total = jobs.len();

        for (slot, job) in jobs.into_iter().enumerate() {
            let tx = tx.clone();
            let storage = Arc::clone(&self.storage);
            let buffer = Arc::clone(&buffer);
            let cancel_worker = cancel.clone();
            let path = job.path.clone();

            let spawned = thread::Builder::new()
                .name(format!("formdrop-write-{slot}"))
                .spawn(move || {
                    let result = match buffer.get(job.range.clone()) {
                        Some(data) => storage.write(&job.path, data, &cancel_worker),
                        None => Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("range {:?} outside request body", job.range),
                        )),
                    };
                    // The receiver is gone once the group gave up
                    let _ = tx.send((job.path, result));
                });

            if let Err(e) = spawned {
                cancel.cancel();
                error!("Failed to spawn writer for {path:?}: {e}");
                return Err(AppError::storage(path, e));
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        let mut pending = total;
        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((path, Ok(()))) => {
                    pending -= 1;
                    debug!("Stored {path:?} ({} of {total} done)", total - pending);
                }
                Ok((path, Err(e))) => {
                    cancel.cancel();
                    error!("Failed to store {path:?}: {e}");
                    return Err(AppError::storage(path, e));
                }
                Err(RecvTimeoutError::Timeout) => {
                    cancel.cancel();
                    warn!(
                        "{pending} of {total} writes still running after {:?}, cancelling",
                        self.timeout
                    );
                    return Err(AppError::StorageTimeout(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    cancel.cancel();
                    error!("A storage worker exited without reporting a result");
                    return Err(AppError::InternalServerError(
                        "storage worker exited unexpectedly".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
