//! Positioned file I/O and a cache of shared open handles.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::error::{Result, TransferError};

/// How a cached file handle may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access (upload source).
    Read,
    /// Read-write access (download target).
    Write,
}

/// A file handle supporting positioned reads and writes.
///
/// All I/O goes through `spawn_blocking` with platform positioned-I/O
/// primitives, so one handle can serve many concurrent part transfers at
/// independent offsets without seeking.
#[derive(Debug)]
pub struct RandomAccessFile {
    file: Arc<File>,
    path: PathBuf,
    mode: AccessMode,
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

impl RandomAccessFile {
    async fn open(path: PathBuf, mode: AccessMode, expected_size: Option<u64>) -> io::Result<Self> {
        let open_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            match mode {
                AccessMode::Read => File::open(&open_path),
                AccessMode::Write => {
                    let file = OpenOptions::new()
                        .read(true)
                        .write(true)
                        .create(true)
                        .truncate(false)
                        .open(&open_path)?;
                    if let Some(size) = expected_size {
                        file.set_len(size)?;
                    }
                    Ok(file)
                }
            }
        })
        .await
        .map_err(|join_err| io::Error::other(join_err.to_string()))??;

        Ok(Self {
            file: Arc::new(file),
            path,
            mode,
        })
    }

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Fewer bytes are returned when the range extends past end-of-file;
    /// callers must check the returned length.
    pub async fn read_at(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || -> io::Result<Bytes> {
            let mut buf = vec![0u8; len];
            let mut filled = 0usize;
            while filled < len {
                let n = pread(&file, &mut buf[filled..], offset + filled as u64)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|join_err| io::Error::other(join_err.to_string()))?
    }

    /// Write all of `data` starting at `offset`.
    pub async fn write_at(&self, offset: u64, data: Bytes) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut written = 0usize;
            while written < data.len() {
                let n = pwrite(&file, &data[written..], offset + written as u64)?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ));
                }
                written += n;
            }
            Ok(())
        })
        .await
        .map_err(|join_err| io::Error::other(join_err.to_string()))?
    }

    /// Flush file data to disk.
    pub async fn sync(&self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(|join_err| io::Error::other(join_err.to_string()))?
    }

    /// The path this handle was opened for.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The access mode this handle was opened with.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

type SharedOpen = Shared<BoxFuture<'static, std::result::Result<Arc<RandomAccessFile>, Arc<io::Error>>>>;

struct CacheEntry {
    mode: AccessMode,
    open: SharedOpen,
}

/// A cache of open file handles keyed by path.
///
/// Concurrent callers for the same path share a single in-flight open; the
/// first caller starts the open and every caller awaits the same shared
/// future. A path is pinned to the mode it was first opened with —
/// requesting the other mode is an error, because uploads and downloads of
/// the same file must not share descriptors.
#[derive(Default)]
pub struct FileHandleCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl FileHandleCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for `path`, opening it if necessary.
    ///
    /// For `AccessMode::Write` with `expected_size`, the file is created
    /// and truncated to that size on first open.
    pub async fn open_or_get(
        &self,
        path: &Path,
        mode: AccessMode,
        expected_size: Option<u64>,
    ) -> Result<Arc<RandomAccessFile>> {
        let open = {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            match entries.get(path) {
                Some(entry) => {
                    if entry.mode != mode {
                        return Err(TransferError::IllegalArgument(format!(
                            "{} is already open with a different access mode",
                            path.display()
                        )));
                    }
                    entry.open.clone()
                }
                None => {
                    let open_path = path.to_path_buf();
                    let open: SharedOpen = async move {
                        RandomAccessFile::open(open_path, mode, expected_size)
                            .await
                            .map(Arc::new)
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    entries.insert(
                        path.to_path_buf(),
                        CacheEntry {
                            mode,
                            open: open.clone(),
                        },
                    );
                    open
                }
            }
        };

        match open.await {
            Ok(file) => Ok(file),
            Err(err) => {
                // Do not pin a failed open; the next caller retries it.
                self.invalidate(path);
                Err(TransferError::Io(io::Error::new(err.kind(), err.to_string())))
            }
        }
    }

    /// Drop the cache entry for `path` without waiting for the handle.
    ///
    /// Used after a write error so the next access reopens the file instead
    /// of reusing a broken descriptor.
    pub fn invalidate(&self, path: &Path) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .remove(path);
    }

    /// Close the handle for `path`, flushing write handles first.
    ///
    /// Close failures are logged and swallowed; a missing entry is not an
    /// error.
    pub async fn close(&self, path: &Path) {
        let entry = self
            .entries
            .lock()
            .expect("cache lock poisoned")
            .remove(path);
        if let Some(entry) = entry
            && let Ok(file) = entry.open.await
            && file.mode() == AccessMode::Write
            && let Err(err) = file.sync().await
        {
            tracing::warn!(path = %path.display(), error = %err, "failed to flush file on close");
        }
    }

    /// Close every cached handle.
    pub async fn close_all(&self) {
        let paths: Vec<PathBuf> = self
            .entries
            .lock()
            .expect("cache lock poisoned")
            .keys()
            .cloned()
            .collect();
        for path in paths {
            self.close(&path).await;
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// True when no handles are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FileHandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandleCache")
            .field("entries", &self.len())
            .finish()
    }
}
