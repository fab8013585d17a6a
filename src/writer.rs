//! Raw message files
//!
//! Each mirrored mailbox is a directory with the usual `new`, `cur`
//! and `tmp` buckets. A message file is named after its global id and
//! written to `tmp` first, then renamed into place, so a reader never
//! sees a partial file.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Where a message file was placed. Decided once, at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Not seen when it was mirrored.
    New,
    /// Seen when it was mirrored.
    Cur,
}

impl Bucket {
    #[must_use]
    pub const fn for_seen(seen: bool) -> Self {
        if seen { Self::Cur } else { Self::New }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Cur => "cur",
        }
    }

    const fn other(self) -> Self {
        match self {
            Self::New => Self::Cur,
            Self::Cur => Self::New,
        }
    }
}

/// A stored message file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageHandle {
    pub bucket: Bucket,
    pub path: PathBuf,
}

/// Writes message files into one mailbox directory.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    dir: PathBuf,
    /// Temp name sequence, shared by clones.
    counter: Arc<AtomicU64>,
}

impl MessageWriter {
    /// Use `dir`, creating it and its buckets if needed.
    ///
    /// # Errors
    ///
    /// Fails when a bucket directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let writer = Self {
            dir: dir.into(),
            counter: Arc::default(),
        };
        for bucket in ["cur", "new", "tmp"] {
            let path = writer.dir.join(bucket);
            fs::create_dir_all(&path).map_err(|e| io_error(&path, &e))?;
        }
        Ok(writer)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `raw` as `<bucket>/<global_id>`, replacing any earlier copy.
    ///
    /// # Errors
    ///
    /// Fails when the temp file cannot be written and synced, or the
    /// rename into the bucket fails. The temp file is removed then.
    pub fn write(&self, global_id: u64, raw: &[u8], seen: bool) -> Result<StorageHandle> {
        let bucket = Bucket::for_seen(seen);
        let (mut file, tmp_path) = self.create_tmp()?;

        let mut guard = UnlinkOnError {
            path_to_unlink: Some(tmp_path.clone()),
        };

        file.write_all(raw).map_err(|e| io_error(&tmp_path, &e))?;
        file.sync_all().map_err(|e| io_error(&tmp_path, &e))?;
        drop(file);

        // Exactly one file per id: drop a copy in the other bucket.
        let stale = self.path_for(bucket.other(), global_id);
        match fs::remove_file(&stale) {
            Ok(()) => debug!(global_id, path = %stale.display(), "Removed copy from other bucket"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&stale, &e)),
        }

        let path = self.path_for(bucket, global_id);
        fs::rename(&tmp_path, &path).map_err(|e| io_error(&path, &e))?;
        guard.path_to_unlink.take();

        debug!(global_id, bucket = bucket.as_str(), bytes = raw.len(), "Stored message file");
        Ok(StorageHandle { bucket, path })
    }

    /// Raw bytes of `global_id`, from whichever bucket holds it.
    ///
    /// # Errors
    ///
    /// [`Error::Storage`] when no file exists or it cannot be read.
    pub fn read(&self, global_id: u64) -> Result<Vec<u8>> {
        let handle = self
            .locate(global_id)
            .ok_or_else(|| Error::Storage(format!("no stored file for message {global_id}")))?;
        fs::read(&handle.path).map_err(|e| io_error(&handle.path, &e))
    }

    /// The current file of `global_id`, if any.
    #[must_use]
    pub fn locate(&self, global_id: u64) -> Option<StorageHandle> {
        [Bucket::Cur, Bucket::New].into_iter().find_map(|bucket| {
            let path = self.path_for(bucket, global_id);
            path.is_file().then_some(StorageHandle { bucket, path })
        })
    }

    /// Delete whichever copy of `global_id` exists. Returns whether a
    /// file was removed.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be deleted.
    pub fn remove(&self, global_id: u64) -> Result<bool> {
        let Some(handle) = self.locate(global_id) else {
            return Ok(false);
        };
        fs::remove_file(&handle.path).map_err(|e| io_error(&handle.path, &e))?;
        Ok(true)
    }

    fn path_for(&self, bucket: Bucket, global_id: u64) -> PathBuf {
        self.dir.join(bucket.as_str()).join(global_id.to_string())
    }

    /// A fresh file in `tmp`, named `<secs>.#<counter>M<nanos>P<pid>`.
    fn create_tmp(&self) -> Result<(fs::File, PathBuf)> {
        let pid = process::id();
        loop {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            let counter = self.counter.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join("tmp").join(format!(
                "{}.#{counter:x}M{}P{pid}",
                ts.as_secs(),
                ts.subsec_nanos()
            ));

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(io_error(&path, &e)),
            }
        }
    }
}

/// Removes the temp file unless the rename went through.
struct UnlinkOnError {
    path_to_unlink: Option<PathBuf>,
}

impl Drop for UnlinkOnError {
    fn drop(&mut self) {
        if let Some(path) = self.path_to_unlink.take() {
            fs::remove_file(path).ok();
        }
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> Error {
    Error::storage(&path.display().to_string(), err)
}
