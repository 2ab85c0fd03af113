//! Multi-file splitter
//!
//! Presents `base`, `base.1`, `base.2`, ... as a single stream. Writes fill the
//! current file up to `max_file_size` and continue in the next one, so every
//! file but the last is exactly `max_file_size` bytes long and the logical
//! offset of `(id, offset)` is `id * max_file_size + offset`.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Default maximum size of one physical file (100 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100_000_000;

/// How the store treats files left by a previous run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing files must be present; writes are rejected
    Read,
    /// Existing files are removed and the stream starts empty
    Write,
    /// Existing files are resumed; missing files are created
    ReadWrite,
}

struct ReadCursor {
    /// Lowest file id still on disk
    first_id: u32,
    id: u32,
    offset: u64,
    file: Option<File>,
}

struct WriteCursor {
    id: u32,
    offset: u64,
    file: Option<File>,
}

/// Logical stream split across size-bounded files
///
/// Thread-safe. The read and write cursors are guarded separately so one
/// reader and one writer do not contend beyond a short look at the write
/// position. Lock order is always read cursor, then write cursor.
pub struct Splitter {
    base_path: PathBuf,
    mode: OpenMode,
    max_file_size: u64,
    auto_delete: bool,
    read: Mutex<ReadCursor>,
    write: Mutex<WriteCursor>,
}

impl Splitter {
    /// Open (or create) the store rooted at `base_path`
    ///
    /// # Errors
    ///
    /// Returns `Error::FileOpen` if the first write file cannot be created, or
    /// in `Read` mode if no file exists.
    pub fn open(
        base_path: impl AsRef<Path>,
        mode: OpenMode,
        max_file_size: u64,
        auto_delete: bool,
    ) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if max_file_size == 0 {
            return Err(Error::Config("max_file_size must be positive".into()));
        }

        if mode != OpenMode::Read {
            if let Some(parent) = base_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| Error::FileOpen {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut ids = existing_ids(&base_path);

        if mode == OpenMode::Write {
            for id in ids.drain(..) {
                remove_file(&file_path(&base_path, id))?;
            }
        }

        let (first_id, last_id) = match (ids.first(), ids.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ if mode == OpenMode::Read => {
                return Err(Error::FileOpen {
                    path: base_path,
                    source: io::Error::from(io::ErrorKind::NotFound),
                });
            }
            _ => (0, 0),
        };

        let last_path = file_path(&base_path, last_id);
        let (write_file, write_offset) = if mode == OpenMode::Read {
            let len = fs::metadata(&last_path)
                .map_err(|source| Error::FileOpen {
                    path: last_path.clone(),
                    source,
                })?
                .len();
            (None, len)
        } else {
            let file = open_for_write(&last_path)?;
            let len = file.metadata()?.len();
            (Some(file), len)
        };

        tracing::debug!(
            path = %base_path.display(),
            first_id = first_id,
            last_id = last_id,
            write_offset = write_offset,
            "Splitter opened"
        );

        Ok(Self {
            base_path,
            mode,
            max_file_size,
            auto_delete,
            read: Mutex::new(ReadCursor {
                first_id,
                id: first_id,
                offset: 0,
                file: None,
            }),
            write: Mutex::new(WriteCursor {
                id: last_id,
                offset: write_offset,
                file: write_file,
            }),
        })
    }

    /// Path of the physical file with the given id
    pub fn file_path(&self, id: u32) -> PathBuf {
        file_path(&self.base_path, id)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn read_id(&self) -> u32 {
        self.read.lock().id
    }

    pub fn read_offset(&self) -> u64 {
        self.read.lock().offset
    }

    pub fn write_id(&self) -> u32 {
        self.write.lock().id
    }

    pub fn write_offset(&self) -> u64 {
        self.write.lock().offset
    }

    /// Logical position of the write cursor (total bytes in the stream)
    pub fn tell(&self) -> u64 {
        let w = self.write.lock();
        self.logical(w.id, w.offset)
    }

    /// Logical position of the read cursor
    pub fn read_position(&self) -> u64 {
        let r = self.read.lock();
        self.logical(r.id, r.offset)
    }

    /// Bytes written but not read yet
    pub fn available(&self) -> u64 {
        let r = self.read.lock();
        let read_pos = self.logical(r.id, r.offset);
        let w = self.write.lock();
        self.logical(w.id, w.offset).saturating_sub(read_pos)
    }

    /// Append `buf` to the stream, rotating files as needed
    ///
    /// Returns the number of bytes written, always `buf.len()` on success. A
    /// failed write leaves no bytes behind: files it created are removed and
    /// the write cursor goes back to where it was.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.mode == OpenMode::Read {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "store opened read-only",
            )));
        }

        let mut w = self.write.lock();
        let start = (w.id, w.offset);

        match self.write_rotating(&mut w, buf) {
            Ok(()) => Ok(buf.len()),
            Err(e) => {
                self.rollback(&mut w, start);
                Err(e)
            }
        }
    }

    fn write_rotating(&self, w: &mut WriteCursor, buf: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < buf.len() {
            let room = self.max_file_size.saturating_sub(w.offset);
            if room == 0 {
                self.rotate(w)?;
                continue;
            }

            let n = (buf.len() - written).min(room as usize);
            if w.file.is_none() {
                w.file = Some(open_for_write(&self.file_path(w.id))?);
            }
            if let Some(file) = w.file.as_mut() {
                file.write_all(&buf[written..written + n])?;
            }
            w.offset += n as u64;
            written += n;
        }
        Ok(())
    }

    /// Undo a partial write back to `(id, offset)`
    fn rollback(&self, w: &mut WriteCursor, (id, offset): (u32, u64)) {
        w.file = None;
        for extra in id + 1..=w.id {
            if let Err(e) = remove_file(&self.file_path(extra)) {
                tracing::warn!(
                    path = %self.file_path(extra).display(),
                    error = %e,
                    "Failed to remove file of an aborted write"
                );
            }
        }

        let path = self.file_path(id);
        let truncated = OpenOptions::new()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_len(offset));
        match truncated {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound && offset == 0 => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                offset = offset,
                error = %e,
                "Failed to truncate file of an aborted write"
            ),
        }

        w.id = id;
        w.offset = offset;
        tracing::debug!(
            path = %self.base_path.display(),
            file_id = id,
            offset = offset,
            "Aborted write rolled back"
        );
    }

    fn rotate(&self, w: &mut WriteCursor) -> Result<()> {
        if let Some(mut file) = w.file.take() {
            file.flush()?;
        }
        w.id += 1;
        w.offset = 0;
        w.file = Some(open_for_write(&self.file_path(w.id))?);

        tracing::debug!(
            path = %self.base_path.display(),
            file_id = w.id,
            "Rotated write file"
        );
        Ok(())
    }

    /// Read up to `buf.len()` bytes from the read cursor
    ///
    /// Never waits for data: returns a short read, or 0, when the writer has
    /// not produced more bytes yet.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut r = self.read.lock();
        let mut total = 0;

        while total < buf.len() {
            let (write_id, write_offset) = {
                let w = self.write.lock();
                (w.id, w.offset)
            };

            let want = if r.id < write_id {
                buf.len() - total
            } else {
                let left = write_offset.saturating_sub(r.offset);
                if left == 0 {
                    break;
                }
                (buf.len() - total).min(left as usize)
            };

            if r.file.is_none() {
                let path = self.file_path(r.id);
                let mut file =
                    File::open(&path).map_err(|source| Error::FileOpen { path, source })?;
                file.seek(SeekFrom::Start(r.offset))?;
                r.file = Some(file);
            }

            let n = match r.file.as_mut() {
                Some(file) => file.read(&mut buf[total..total + want])?,
                None => 0,
            };

            if n == 0 {
                if r.id < write_id {
                    self.advance_read_file(&mut r)?;
                    continue;
                }
                break;
            }

            r.offset += n as u64;
            total += n;
        }

        Ok(total)
    }

    fn advance_read_file(&self, r: &mut ReadCursor) -> Result<()> {
        r.file = None;
        if self.auto_delete {
            let path = self.file_path(r.id);
            remove_file(&path)?;
            r.first_id = r.id + 1;
            tracing::trace!(path = %path.display(), "Removed consumed file");
        }
        r.id += 1;
        r.offset = 0;
        Ok(())
    }

    /// Move the read cursor to a logical position
    ///
    /// `End` is relative to the write position. The target is clamped between
    /// the first file still on disk and the write position.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let mut r = self.read.lock();
        let (write_id, write_offset) = {
            let w = self.write.lock();
            (w.id, w.offset)
        };

        let current = self.logical(r.id, r.offset) as i128;
        let end = self.logical(write_id, write_offset) as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => current + d as i128,
            SeekFrom::End(d) => end + d as i128,
        };
        let lowest = self.logical(r.first_id, 0) as i128;
        let target = target.clamp(lowest, end) as u64;

        let mut id = (target / self.max_file_size) as u32;
        let mut offset = target % self.max_file_size;
        if id > write_id {
            id = write_id;
            offset = write_offset;
        }

        r.id = id;
        r.offset = offset;
        r.file = None;
        Ok(target)
    }

    /// Flush the write file to disk
    pub fn flush(&self) -> Result<()> {
        let mut w = self.write.lock();
        if let Some(file) = w.file.as_mut() {
            file.flush()?;
            file.sync_data()?;
        }
        Ok(())
    }

    /// Flush and release file handles; the store reopens them lazily
    pub fn close(&self) -> Result<()> {
        let mut r = self.read.lock();
        let mut w = self.write.lock();
        r.file = None;
        if let Some(mut file) = w.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    /// Delete every physical file from the read file through the write file
    ///
    /// The store stays usable and restarts at id 0.
    pub fn remove_all_files(&self) -> Result<()> {
        let mut r = self.read.lock();
        let mut w = self.write.lock();
        r.file = None;
        w.file = None;

        for id in r.first_id.min(r.id)..=w.id {
            remove_file(&self.file_path(id))?;
        }

        tracing::debug!(
            path = %self.base_path.display(),
            files = w.id + 1 - r.first_id.min(r.id),
            "Removed all files"
        );

        *r = ReadCursor {
            first_id: 0,
            id: 0,
            offset: 0,
            file: None,
        };
        *w = WriteCursor {
            id: 0,
            offset: 0,
            file: None,
        };
        Ok(())
    }

    fn logical(&self, id: u32, offset: u64) -> u64 {
        id as u64 * self.max_file_size + offset
    }
}

impl std::fmt::Debug for Splitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitter")
            .field("base_path", &self.base_path)
            .field("mode", &self.mode)
            .field("max_file_size", &self.max_file_size)
            .field("auto_delete", &self.auto_delete)
            .finish()
    }
}

fn file_path(base: &Path, id: u32) -> PathBuf {
    if id == 0 {
        return base.to_path_buf();
    }
    let mut name = OsString::from(base.as_os_str());
    name.push(format!(".{}", id));
    PathBuf::from(name)
}

/// Ids of the files already present for `base`, sorted
fn existing_ids(base: &Path) -> Vec<u32> {
    let dir = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(stem) = base.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };

    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let prefix = format!("{}.", stem);
    let mut ids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if name == stem {
                Some(0)
            } else {
                name.strip_prefix(prefix.as_str())?.parse::<u32>().ok().filter(|id| *id > 0)
            }
        })
        .collect();
    ids.sort_unstable();
    ids
}

fn open_for_write(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}
