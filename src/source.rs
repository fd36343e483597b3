//! Byte producers for entry content.
//!
//! A [`ZipSource`] is handed to the archive by value when an entry is added
//! or replaced. The change log owns it until the commit consumes it, so there
//! is no shared ownership to balance: a replaced source is dropped (and rolled
//! back) the moment its successor arrives.

use crate::error::{Result, ZipError};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Size and modification time reported by a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStat {
    /// `None` when the producer cannot tell in advance
    pub size: Option<u64>,
    pub mtime: Option<SystemTime>,
}

/// Pull-based producer implemented by callers.
///
/// Only `read` is required. Every read pass after the first starts with
/// `seek(SeekFrom::Start(0))`, so sources that should be extracted before
/// commit and still be read again by the commit must implement `seek`.
pub trait SourceCallback: Send {
    /// Called before every read pass.
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "source does not support seeking",
        ))
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.seek(SeekFrom::Current(0))
    }

    fn stat(&mut self) -> io::Result<SourceStat> {
        Ok(SourceStat::default())
    }

    /// Called after every read pass, including failed ones.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// The archive holding this source's content was written successfully.
    fn commit(&mut self) {}

    /// The content was discarded: the commit failed, the change was undone,
    /// or the archive was dropped without committing.
    fn rollback(&mut self) {}
}

/// `Read + Seek` object usable as a stream source.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

struct FnSource<F> {
    pull: F,
    opened: bool,
}

impl<F> SourceCallback for FnSource<F>
where
    F: FnMut(&mut [u8]) -> io::Result<usize> + Send,
{
    fn open(&mut self) -> io::Result<()> {
        if self.opened {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "pull source cannot be read twice",
            ));
        }
        self.opened = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (self.pull)(buf)
    }
}

enum SourceKind {
    File {
        path: PathBuf,
        start: u64,
        length: Option<u64>,
    },
    Buffer(Arc<[u8]>),
    Stream {
        reader: Box<dyn ReadSeek + Send>,
        start: u64,
        length: Option<u64>,
    },
    Callback {
        callback: Box<dyn SourceCallback>,
        passes: u64,
    },
}

/// Content for one entry.
pub struct ZipSource {
    kind: SourceKind,
    mtime: Option<SystemTime>,
}

impl fmt::Debug for ZipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::File {
                path,
                start,
                length,
            } => f
                .debug_struct("ZipSource::File")
                .field("path", path)
                .field("start", start)
                .field("length", length)
                .finish(),
            SourceKind::Buffer(data) => f
                .debug_struct("ZipSource::Buffer")
                .field("len", &data.len())
                .finish(),
            SourceKind::Stream { start, length, .. } => f
                .debug_struct("ZipSource::Stream")
                .field("start", start)
                .field("length", length)
                .finish(),
            SourceKind::Callback { passes, .. } => f
                .debug_struct("ZipSource::Callback")
                .field("passes", passes)
                .finish(),
        }
    }
}

impl ZipSource {
    /// Whole file at `path`.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Self::file_range(path, 0, None)
    }

    /// `length` bytes of the file starting at `start`; `None` reads to EOF.
    pub fn file_range(path: impl AsRef<Path>, start: u64, length: Option<u64>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = std::fs::metadata(&path).map_err(|e| ZipError::file_open(&path, e))?;
        if !meta.is_file() {
            return Err(ZipError::file_open(
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(Self {
            kind: SourceKind::File {
                path,
                start,
                length,
            },
            mtime: meta.modified().ok(),
        })
    }

    pub fn buffer(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: SourceKind::Buffer(Arc::from(data.into())),
            mtime: None,
        }
    }

    /// Shared buffer; clones of the source reuse the same allocation.
    pub fn shared_buffer(data: Arc<[u8]>) -> Self {
        Self {
            kind: SourceKind::Buffer(data),
            mtime: None,
        }
    }

    /// Region of an already open seekable stream.
    pub fn stream<R>(reader: R, start: u64, length: Option<u64>) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self {
            kind: SourceKind::Stream {
                reader: Box::new(reader),
                start,
                length,
            },
            mtime: None,
        }
    }

    pub fn callback(callback: impl SourceCallback + 'static) -> Self {
        Self {
            kind: SourceKind::Callback {
                callback: Box::new(callback),
                passes: 0,
            },
            mtime: None,
        }
    }

    /// Single-pass pull function; returning `Ok(0)` ends the content.
    pub fn from_fn<F>(pull: F) -> Self
    where
        F: FnMut(&mut [u8]) -> io::Result<usize> + Send + 'static,
    {
        Self::callback(FnSource {
            pull,
            opened: false,
        })
    }

    /// Override the modification time recorded for the entry.
    pub fn with_mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn stat(&mut self) -> Result<SourceStat> {
        let mtime = self.mtime;
        let size = match &mut self.kind {
            SourceKind::File {
                path,
                start,
                length,
            } => {
                let total = std::fs::metadata(&*path)
                    .map_err(|e| ZipError::file_open(&*path, e))?
                    .len();
                let available = total.saturating_sub(*start);
                Some(length.map_or(available, |l| l.min(available)))
            }
            SourceKind::Buffer(data) => Some(data.len() as u64),
            SourceKind::Stream {
                reader,
                start,
                length,
            } => match length {
                Some(l) => Some(*l),
                None => {
                    let end = reader.seek(SeekFrom::End(0))?;
                    Some(end.saturating_sub(*start))
                }
            },
            SourceKind::Callback { callback, .. } => {
                let stat = callback.stat()?;
                return Ok(SourceStat {
                    size: stat.size,
                    mtime: mtime.or(stat.mtime),
                });
            }
        };
        Ok(SourceStat { size, mtime })
    }

    /// Start a read pass from the beginning of the content.
    pub fn open(&mut self) -> Result<SourceReader<'_>> {
        let inner = match &mut self.kind {
            SourceKind::File {
                path,
                start,
                length,
            } => {
                let mut file = File::open(&*path).map_err(|e| ZipError::file_open(&*path, e))?;
                if *start > 0 {
                    file.seek(SeekFrom::Start(*start))?;
                }
                let limit = length.unwrap_or(u64::MAX);
                ReaderKind::File(BufReader::new(file).take(limit))
            }
            SourceKind::Buffer(data) => ReaderKind::Buffer(Cursor::new(&data[..])),
            SourceKind::Stream {
                reader,
                start,
                length,
            } => {
                reader.seek(SeekFrom::Start(*start))?;
                let limit = length.unwrap_or(u64::MAX);
                let reader: &mut (dyn ReadSeek + Send) = &mut **reader;
                ReaderKind::Stream(reader.take(limit))
            }
            SourceKind::Callback { callback, passes } => {
                callback.open()?;
                if *passes > 0 {
                    if let Err(e) = callback.seek(SeekFrom::Start(0)) {
                        if let Err(close_err) = callback.close() {
                            log::warn!("source close failed: {}", close_err);
                        }
                        return Err(match e.kind() {
                            io::ErrorKind::Unsupported => ZipError::unsupported(
                                "reading a non-seekable callback source more than once",
                            ),
                            _ => ZipError::from(e),
                        });
                    }
                }
                *passes += 1;
                ReaderKind::Callback(&mut **callback)
            }
        };
        Ok(SourceReader { inner })
    }

    /// Second handle to the same content, for file and buffer sources.
    pub fn try_clone(&self) -> Option<ZipSource> {
        let kind = match &self.kind {
            SourceKind::File {
                path,
                start,
                length,
            } => SourceKind::File {
                path: path.clone(),
                start: *start,
                length: *length,
            },
            SourceKind::Buffer(data) => SourceKind::Buffer(Arc::clone(data)),
            SourceKind::Stream { .. } | SourceKind::Callback { .. } => return None,
        };
        Some(ZipSource {
            kind,
            mtime: self.mtime,
        })
    }

    pub(crate) fn commit(&mut self) {
        if let SourceKind::Callback { callback, .. } = &mut self.kind {
            callback.commit();
        }
    }

    pub(crate) fn rollback(&mut self) {
        if let SourceKind::Callback { callback, .. } = &mut self.kind {
            callback.rollback();
        }
    }
}

enum ReaderKind<'a> {
    File(io::Take<BufReader<File>>),
    Buffer(Cursor<&'a [u8]>),
    Stream(io::Take<&'a mut (dyn ReadSeek + Send)>),
    Callback(&'a mut dyn SourceCallback),
}

/// One read pass over a [`ZipSource`].
pub struct SourceReader<'a> {
    inner: ReaderKind<'a>,
}

impl std::fmt::Debug for SourceReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader").finish_non_exhaustive()
    }
}

impl Read for SourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ReaderKind::File(r) => r.read(buf),
            ReaderKind::Buffer(r) => r.read(buf),
            ReaderKind::Stream(r) => r.read(buf),
            ReaderKind::Callback(cb) => cb.read(buf),
        }
    }
}

impl Drop for SourceReader<'_> {
    fn drop(&mut self) {
        if let ReaderKind::Callback(cb) = &mut self.inner {
            if let Err(e) = cb.close() {
                log::warn!("source close failed: {}", e);
            }
        }
    }
}
