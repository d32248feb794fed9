//! Async file handles: a page-aligned buffer cache sitting in front of
//! blocking `std::fs` calls dispatched onto an [`crate::io::ThreadPool`].
//!
//! The teacher's `file.rs` talks straight to `std::fs`/`BufReader` on the
//! calling thread (`patch_seq_file_slurp`, `patch_seq_file_exists`) with no
//! cache or pool of any kind; there's no literal teacher shape to adapt
//! here, so the read/write algorithms below follow the page-alignment and
//! chunking rules directly, expressed with the same `Mutex`+thread-pool
//! idiom as [`crate::scheduler::Scheduler`] and backed by
//! [`glyph_cache::Cache`] the way the module repository is backed by a
//! plain directory.

use crate::io::ThreadPool;
use glyph_core::error::{ErrorKind, RuntimeError};
use glyph_cache::Cache;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Chunk size a single write syscall is broken into (spec §4.F).
pub const MAX_WRITE_BUFFER_SIZE: u64 = 4 * 1024 * 1024;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    handle_id: u64,
    page_start: u64,
}

/// `((pos - 1) / alignment) * alignment + 1`: the 1-indexed start of the
/// aligned page containing byte `pos`.
fn augmented_start(pos: u64, alignment: u64) -> u64 {
    ((pos - 1) / alignment) * alignment + 1
}

/// `((pos + size + alignment - 2) / alignment) * alignment`: the 1-indexed
/// end (inclusive) of the aligned page containing the last requested byte.
fn augmented_end(pos: u64, size: u64, alignment: u64) -> u64 {
    ((pos + size + alignment - 2) / alignment) * alignment
}

/// The aligned page starts (1-indexed) covering `[pos, pos+size)`.
fn page_starts(pos: u64, size: u64, alignment: u64) -> Vec<u64> {
    let start = augmented_start(pos, alignment);
    let end = augmented_end(pos, size, alignment);
    let mut starts = Vec::new();
    let mut p = start;
    while p <= end {
        starts.push(p);
        p += alignment;
    }
    starts
}

/// An open file: a serialized handle to the underlying OS file plus an
/// aligned-page cache shared across concurrent reads and writes.
pub struct FileHandle {
    id: u64,
    file: Mutex<std::fs::File>,
    alignment: u64,
    cache: Arc<Cache<BufferKey, Vec<u8>>>,
    path: PathBuf,
}

impl FileHandle {
    pub fn open(path: impl AsRef<Path>, alignment: u64, writable: bool) -> Result<Self, RuntimeError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(writable)
            .open(&path)?;
        Ok(FileHandle {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            file: Mutex::new(file),
            alignment,
            cache: Arc::new(Cache::new(256, 1024)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `size` bytes starting at 1-indexed `pos`, dispatched onto
    /// `pool`. Calls `on_success`/`on_failure` from the pool worker thread.
    pub fn read(
        self: &Arc<Self>,
        pos: u64,
        size: u64,
        pool: &ThreadPool,
        on_success: impl FnOnce(Vec<u8>) + Send + 'static,
        on_failure: impl FnOnce(RuntimeError) + Send + 'static,
    ) {
        let handle = self.clone();
        pool.execute(move || match handle.read_blocking(pos, size) {
            Ok(bytes) => on_success(bytes),
            Err(e) => on_failure(e),
        });
    }

    fn read_blocking(&self, pos: u64, size: u64) -> Result<Vec<u8>, RuntimeError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let starts = page_starts(pos, size, self.alignment);
        let aug_start = starts[0];

        let pages: Vec<Option<Vec<u8>>> = starts.iter().map(|k| {
            self.cache.poll(&BufferKey { handle_id: self.id, page_start: *k })
                .map(|arc| (*arc).clone())
        }).collect();

        if pages.iter().all(Option::is_some) {
            let mut buf = Vec::new();
            for page in pages.into_iter().flatten() {
                buf.extend_from_slice(&page);
            }
            return Ok(slice_augmented(&buf, aug_start, pos, size));
        }

        // Not every page was cached: re-read the whole augmented range in
        // one call and reseed every full page it covers.
        let aug_end = *starts.last().unwrap() + self.alignment - 1;
        let read_len = aug_end - aug_start + 1;
        let mut buf = vec![0u8; read_len as usize];
        {
            let mut file = self.file.lock().expect("file handle lock poisoned");
            file.seek(SeekFrom::Start(aug_start - 1))?;
            let mut total = 0usize;
            while total < buf.len() {
                let n = file.read(&mut buf[total..])?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            buf.truncate(total);
        }
        for page_start in &starts {
            let offset = (page_start - aug_start) as usize;
            if offset + self.alignment as usize <= buf.len() {
                let page = buf[offset..offset + self.alignment as usize].to_vec();
                let key = BufferKey { handle_id: self.id, page_start: *page_start };
                let _ = self.cache.get(&key, || Ok(page));
            }
        }
        Ok(slice_augmented(&buf, aug_start, pos, size))
    }

    /// Write `bytes` at 1-indexed `pos`, chunked to at most
    /// `MAX_WRITE_BUFFER_SIZE` with every chunk but the last truncated to
    /// an alignment boundary, dispatched onto `pool`.
    pub fn write(
        self: &Arc<Self>,
        pos: u64,
        bytes: Vec<u8>,
        pool: &ThreadPool,
        on_success: impl FnOnce() + Send + 'static,
        on_failure: impl FnOnce(RuntimeError) + Send + 'static,
    ) {
        let handle = self.clone();
        pool.execute(move || match handle.write_blocking(pos, &bytes) {
            Ok(()) => on_success(),
            Err(e) => {
                handle.cache.clear();
                on_failure(e)
            }
        });
    }

    fn write_blocking(&self, pos: u64, bytes: &[u8]) -> Result<(), RuntimeError> {
        let mut written = 0u64;
        while written < bytes.len() as u64 {
            let chunk_pos = pos + written;
            let remaining = bytes.len() as u64 - written;
            let mut chunk_len = remaining.min(MAX_WRITE_BUFFER_SIZE);
            if chunk_len < remaining {
                // Not the last chunk: truncate to the last alignment
                // boundary within this chunk so each write lands on a
                // page edge.
                let chunk_end = chunk_pos + chunk_len - 1;
                let aligned_end = (chunk_end / self.alignment) * self.alignment;
                if aligned_end >= chunk_pos {
                    chunk_len = aligned_end - chunk_pos + 1;
                }
            }
            let slice = &bytes[written as usize..(written + chunk_len) as usize];
            {
                let mut file = self.file.lock().expect("file handle lock poisoned");
                file.seek(SeekFrom::Start(chunk_pos - 1))?;
                file.write_all(slice)?;
            }
            self.update_cache_after_write(chunk_pos, slice);
            written += chunk_len;
        }
        Ok(())
    }

    fn update_cache_after_write(&self, pos: u64, bytes: &[u8]) {
        for page_start in page_starts(pos, bytes.len() as u64, self.alignment) {
            let page_end = page_start + self.alignment - 1;
            let write_start = pos.max(page_start);
            let write_end = (pos + bytes.len() as u64 - 1).min(page_end);
            let key = BufferKey { handle_id: self.id, page_start };
            let existing = self.cache.poll(&key);

            let full_page_write = write_start == page_start && write_end == page_end;
            if full_page_write {
                let slice_start = (page_start - pos) as usize;
                let page = bytes[slice_start..slice_start + self.alignment as usize].to_vec();
                self.cache.remove(&key);
                let _ = self.cache.get(&key, || Ok(page));
            } else if let Some(existing) = existing {
                // Partial overwrite of an already-cached page: splice the
                // new bytes into the existing cached tuple.
                let mut page = (*existing).clone();
                let dst_offset = (write_start - page_start) as usize;
                let src_offset = (write_start - pos) as usize;
                let len = (write_end - write_start + 1) as usize;
                page[dst_offset..dst_offset + len]
                    .copy_from_slice(&bytes[src_offset..src_offset + len]);
                self.cache.remove(&key);
                let _ = self.cache.get(&key, || Ok(page));
            }
            // Partial overwrite of an uncached page: drop the change,
            // leaving the page uncached so the next read re-fetches it.
        }
    }

    pub fn sync(&self) -> Result<(), RuntimeError> {
        self.file.lock().expect("file handle lock poisoned").sync_all()?;
        Ok(())
    }

    pub fn truncate(&self, size: u64) -> Result<(), RuntimeError> {
        self.file.lock().expect("file handle lock poisoned").set_len(size)?;
        self.cache.clear();
        Ok(())
    }

    pub fn close(&self) {
        self.cache.clear();
    }
}

/// Slice `[pos, pos+size)` (1-indexed) out of `buf`, which starts at the
/// 1-indexed position `aug_start`.
fn slice_augmented(buf: &[u8], aug_start: u64, pos: u64, size: u64) -> Vec<u8> {
    let start = (pos - aug_start) as usize;
    let end = (start as u64 + size).min(buf.len() as u64) as usize;
    if start >= buf.len() {
        return Vec::new();
    }
    buf[start..end].to_vec()
}

pub fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>, replace: bool) -> Result<(), RuntimeError> {
    let dst = dst.as_ref();
    if !replace && dst.exists() {
        return Err(RuntimeError::new(ErrorKind::FileExists, format!("{} already exists", dst.display())));
    }
    std::fs::rename(src, dst)?;
    Ok(())
}

pub fn unlink(
    path: impl AsRef<Path>,
    recursive: bool,
    must_exist: bool,
    follow_symlinks: bool,
) -> Result<(), RuntimeError> {
    let path = path.as_ref();
    let meta = if follow_symlinks {
        std::fs::metadata(path)
    } else {
        std::fs::symlink_metadata(path)
    };
    let meta = match meta {
        Ok(meta) => meta,
        Err(e) if !must_exist && e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let result = if meta.is_dir() {
        if recursive {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_dir(path)
        }
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if !must_exist && e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
