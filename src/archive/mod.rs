//! Archive handle.
//!
//! An [`Archive`] reads the central directory once at open time and keeps it
//! immutable. Every modification is recorded in a change log keyed by entry
//! index; the container file itself is only rewritten by [`Archive::close`],
//! which streams the resulting entry set into a temporary file next to the
//! archive and moves it over the original. Dropping an open archive, or
//! calling [`Archive::discard`], throws the change log away.
//!
//! ```no_run
//! use ziprw::{Archive, OpenMode};
//!
//! let mut archive = Archive::open("docs.zip", OpenMode::CREATE)?;
//! archive.add_buffer("README.txt", b"hello".to_vec(), false)?;
//! archive.set_comment("generated")?;
//! archive.close()?;
//! # Ok::<(), ziprw::ZipError>(())
//! ```

mod changes;
mod commit;

use self::changes::{ChangeLog, EncryptionChange, EntryChange, PendingContent};
use crate::entry::name::{decode_cp437, encode_name};
use crate::entry::stat::{EntryInfo, EntryStat};
use crate::entry::Entry;
use crate::error::{Result, ZipError};
use crate::platform::{current_platform, Platform};
use crate::progress::ProgressReporter;
use crate::source::{SourceStat, ZipSource};
use crate::types::{
    CompressionLevel, CompressionMethod, EncryptionMethod, ExternalAttributes, FileType,
    HostSystem, LocateFlags, OpenMode,
};
use crate::unzip::reader::{open_stored, EntryReader};
use crate::zip::format::{DirectoryRecord, FLAG_LEVEL_MASK, FLAG_UTF8, MAX_U16};
use crate::zip::reader::{check_local_header, read_central_directory};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Committed,
    Discarded,
}

/// A ZIP archive opened for reading and modification.
pub struct Archive {
    path: PathBuf,
    mode: OpenMode,
    state: State,
    /// `None` for archives that do not exist on disk yet or were truncated
    file: Option<File>,
    base: Vec<DirectoryRecord>,
    base_stats: Vec<EntryStat>,
    base_comment: Vec<u8>,
    changes: ChangeLog,
    /// Indices handed out so far; added entries take the next one
    slots: u64,
    /// Existing content is discarded on commit
    truncated: bool,
    default_password: Option<Zeroizing<String>>,
    default_compression: (CompressionMethod, CompressionLevel),
    progress: Option<Box<dyn ProgressReporter>>,
    last_error: Option<ZipError>,
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("entries", &self.base.len())
            .field("pending_changes", &self.changes.len())
            .field("truncated", &self.truncated)
            .finish()
    }
}

impl Archive {
    fn empty(path: PathBuf, mode: OpenMode) -> Self {
        Self {
            path,
            mode,
            state: State::Open,
            file: None,
            base: Vec::new(),
            base_stats: Vec::new(),
            base_comment: Vec::new(),
            changes: ChangeLog::default(),
            slots: 0,
            truncated: false,
            default_password: None,
            default_compression: (CompressionMethod::Default, CompressionLevel::default()),
            progress: None,
            last_error: None,
        }
    }

    /// Open the archive at `path`.
    ///
    /// A missing file is an error unless `mode` contains
    /// [`OpenMode::CREATE`], in which case an empty archive is started and
    /// only written on the first commit that has something to write.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !mode.contains(OpenMode::CREATE) {
                    return Err(ZipError::NotFound { path });
                }
                log::debug!("starting new archive '{}'", path.display());
                return Ok(Self::empty(path, mode));
            }
            Err(e) => return Err(ZipError::file_open(&path, e)),
        };

        if mode.contains(OpenMode::CREATE) && mode.contains(OpenMode::EXCLUSIVE) {
            return Err(ZipError::AlreadyExists { path });
        }
        if !meta.is_file() {
            return Err(ZipError::file_open(
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let mut archive = Self::empty(path, mode);
        if mode.contains(OpenMode::TRUNCATE) {
            archive.truncated = true;
            return Ok(archive);
        }
        if meta.len() == 0 {
            return Ok(archive);
        }

        let mut file = File::open(&archive.path).map_err(|e| ZipError::file_open(&archive.path, e))?;
        let directory = match read_central_directory(&mut file) {
            Ok(directory) => directory,
            Err(e @ ZipError::FormatError { .. }) if mode.contains(OpenMode::CREATE) => {
                log::warn!(
                    "'{}' is not a ZIP archive ({}), it will be overwritten",
                    archive.path.display(),
                    e
                );
                archive.truncated = true;
                return Ok(archive);
            }
            Err(e) => return Err(e),
        };

        if mode.contains(OpenMode::CHECK_CONSISTENCY) {
            for record in &directory.records {
                check_local_header(&mut file, record)?;
            }
        }

        archive.base_stats = directory
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| EntryStat::from_record(i as u64, record))
            .collect();
        archive.slots = directory.records.len() as u64;
        archive.base = directory.records;
        archive.base_comment = directory.comment;
        archive.file = Some(file);

        log::debug!(
            "opened '{}' with {} entries",
            archive.path.display(),
            archive.base.len()
        );
        Ok(archive)
    }

    /// Open or create with consistency checks.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, OpenMode::CREATE | OpenMode::CHECK_CONSISTENCY)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether closing would rewrite the file.
    pub fn is_dirty(&self) -> bool {
        self.state == State::Open && (self.truncated || !self.changes.is_empty())
    }

    // ---- state checks ----

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Committed => Err(ZipError::internal("archive has already been closed")),
            State::Discarded => Err(ZipError::internal("archive has already been discarded")),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.mode.contains(OpenMode::READ_ONLY) {
            return Err(ZipError::ReadOnly);
        }
        Ok(())
    }

    fn base_len(&self) -> u64 {
        self.base.len() as u64
    }

    fn is_live(&self, index: u64) -> bool {
        match self.changes.get(index) {
            Some(change) => !change.deleted && (change.added || index < self.base_len()),
            None => index < self.base_len(),
        }
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if self.is_live(index) {
            Ok(())
        } else {
            Err(ZipError::NoSuchEntry { index })
        }
    }

    /// Live indices in commit order.
    fn live_indices(&self) -> Vec<u64> {
        let base = (0..self.base_len()).filter(|&i| self.is_live(i));
        let added = self.changes.added_indices().filter(|&i| self.is_live(i));
        base.chain(added).collect()
    }

    fn current_name(&self, index: u64) -> &str {
        if let Some(name) = self.changes.get(index).and_then(|c| c.name.as_deref()) {
            return name;
        }
        self.base_stats
            .get(index as usize)
            .map_or("", |stat| stat.name.as_str())
    }

    fn find_exact(&self, name: &str) -> Option<u64> {
        self.live_indices()
            .into_iter()
            .find(|&i| self.current_name(i) == name)
    }

    fn record_error(&mut self, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::debug!("{}: {}", self.path.display(), e);
                self.last_error = Some(e);
                false
            }
        }
    }

    pub(crate) fn set_last_error(&mut self, error: ZipError) {
        self.last_error = Some(error);
    }

    /// Error behind the most recent `false` from a boolean wrapper.
    pub fn last_error(&self) -> Option<&ZipError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<ZipError> {
        self.last_error.take()
    }

    // ---- reading ----

    /// Metadata of a live entry, pending changes applied.
    ///
    /// Compressed size and CRC of entries with pending content are 0 until
    /// the archive is committed.
    pub fn stat(&self, index: u64) -> Result<EntryStat> {
        self.ensure_open()?;
        self.check_index(index)?;

        let mut stat = match self.base_stats.get(index as usize) {
            Some(stat) => stat.clone(),
            None => EntryStat {
                index,
                name: String::new(),
                raw_name: Vec::new(),
                compressed_size: 0,
                uncompressed_size: 0,
                crc32: 0,
                modified: UNIX_EPOCH,
                compression_method: CompressionMethod::Default,
                encryption_method: EncryptionMethod::None,
                external_attributes: ExternalAttributes::new(HostSystem::Unix, 0),
                flags: 0,
            },
        };

        if let Some(change) = self.changes.get(index) {
            if let Some(name) = &change.name {
                let (raw, utf8) = encode_name(name);
                stat.name = name.clone();
                stat.raw_name = raw;
                stat.flags = (stat.flags & !FLAG_UTF8) | utf8;
            }
            if let Some(attributes) = change.attributes {
                stat.external_attributes = attributes;
            }
            if let Some(modified) = change.modified {
                stat.modified = modified;
            }
            if let Some((method, level)) = change.compression {
                stat.compression_method = method;
                stat.flags = (stat.flags & !FLAG_LEVEL_MASK) | level.to_flags();
            }
            if let Some(encryption) = &change.encryption {
                stat.encryption_method = encryption.method;
            }
            if let Some(content) = &change.content {
                stat.uncompressed_size = content.stat.size.unwrap_or(0);
                stat.compressed_size = 0;
                stat.crc32 = 0;
            }
        }
        Ok(stat)
    }

    /// Metadata as read at open time, ignoring pending changes.
    pub fn original_stat(&self, index: u64) -> Result<EntryStat> {
        self.ensure_open()?;
        self.base_stats
            .get(index as usize)
            .cloned()
            .ok_or(ZipError::NoSuchEntry { index })
    }

    /// All live entries, in index order.
    pub fn get_entries(&self) -> Result<Vec<EntryInfo>> {
        self.ensure_open()?;
        self.live_indices()
            .into_iter()
            .map(|i| self.stat(i).map(EntryInfo::from))
            .collect()
    }

    pub fn entry_count(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.live_indices().len() as u64)
    }

    /// Index of the live entry called `name`.
    pub fn locate(&self, name: &str, flags: LocateFlags) -> Result<Option<u64>> {
        self.ensure_open()?;
        let case_insensitive = flags.contains(LocateFlags::CASE_INSENSITIVE);
        let wanted = if case_insensitive {
            name.to_lowercase()
        } else {
            name.to_string()
        };

        Ok(self.live_indices().into_iter().find(|&i| {
            let mut current = self.current_name(i);
            if flags.contains(LocateFlags::IGNORE_DIRECTORY) {
                current = current.rsplit('/').next().unwrap_or(current);
            }
            if case_insensitive {
                current.to_lowercase() == wanted
            } else {
                current == wanted
            }
        }))
    }

    fn locate_case(&self, name: &str, case_sensitive: bool) -> Result<Option<u64>> {
        let flags = if case_sensitive {
            LocateFlags::NONE
        } else {
            LocateFlags::CASE_INSENSITIVE
        };
        self.locate(name, flags)
    }

    pub fn contains_entry(&self, name: &str, case_sensitive: bool) -> Result<bool> {
        Ok(self.locate_case(name, case_sensitive)?.is_some())
    }

    /// Handle to the entry at `index`.
    pub fn read_entry(&mut self, index: u64) -> Result<Entry<'_>> {
        let info = EntryInfo::from(self.stat(index)?);
        Ok(Entry::new(self, info))
    }

    pub fn read_entry_by_name(&mut self, name: &str, case_sensitive: bool) -> Result<Entry<'_>> {
        match self.locate_case(name, case_sensitive)? {
            Some(index) => self.read_entry(index),
            None => Err(ZipError::EntryNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Streaming reader over the current content of an entry.
    ///
    /// Entries with pending content read from their source; other entries
    /// are decoded from the archive file. `password` takes precedence over
    /// the archive's default password.
    pub fn open_entry(&mut self, index: u64, password: Option<&str>) -> Result<EntryReader<'_>> {
        let stat = self.stat(index)?;
        let pending = self
            .changes
            .get(index)
            .map_or(false, |change| change.content.is_some());

        if pending {
            let content = self
                .changes
                .get_mut(index)
                .and_then(|change| change.content.as_mut())
                .ok_or_else(|| ZipError::internal("pending content vanished"))?;
            let reader = content.source.open()?;
            return Ok(EntryReader::new(
                Box::new(reader),
                stat.name,
                stat.uncompressed_size,
            ));
        }

        let record = self
            .base
            .get(index as usize)
            .ok_or(ZipError::NoSuchEntry { index })?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ZipError::internal("archive file is not open"))?;
        let password = password.or(self.default_password.as_ref().map(|p| p.as_str()));
        let inner = open_stored(file, record, &stat.name, password)?;
        Ok(EntryReader::new(inner, stat.name, stat.uncompressed_size))
    }

    // ---- comments ----

    pub fn comment(&self) -> Result<Option<String>> {
        self.ensure_open()?;
        match &self.changes.comment {
            Some(comment) => Ok(comment.clone()),
            None => self.original_comment(),
        }
    }

    pub fn original_comment(&self) -> Result<Option<String>> {
        self.ensure_open()?;
        if self.base_comment.is_empty() {
            return Ok(None);
        }
        Ok(Some(match std::str::from_utf8(&self.base_comment) {
            Ok(s) => s.to_string(),
            Err(_) => decode_cp437(&self.base_comment),
        }))
    }

    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        self.ensure_writable()?;
        if comment.len() as u64 > MAX_U16 {
            return Err(ZipError::IntegerOverflow {
                what: "archive comment length",
            });
        }
        self.changes.comment = Some(Some(comment.to_string()));
        Ok(())
    }

    pub fn delete_comment(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.changes.comment = Some(None);
        Ok(())
    }

    // ---- adding ----

    fn validate_name(name: &str) -> Result<()> {
        let reason = if name.is_empty() {
            "name is empty"
        } else if name.contains('\0') {
            "name contains NUL"
        } else if name.len() as u64 > MAX_U16 {
            "name is longer than 65535 bytes"
        } else {
            return Ok(());
        };
        Err(ZipError::InvalidName {
            name: name.to_string(),
            reason,
        })
    }

    fn default_attributes(name: &str) -> ExternalAttributes {
        if name.ends_with('/') {
            ExternalAttributes::unix(FileType::S_IFDIR | 0o755)
        } else {
            ExternalAttributes::unix(FileType::S_IFREG | 0o644)
        }
    }

    fn insert_content(
        &mut self,
        name: &str,
        mut source: ZipSource,
        overwrite: bool,
        attributes: Option<ExternalAttributes>,
    ) -> Result<u64> {
        if let Some(existing) = self.find_exact(name) {
            if !overwrite {
                return Err(ZipError::EntryExists {
                    name: name.to_string(),
                });
            }
            self.replace_entry(existing, source)?;
            if attributes.is_some() {
                self.changes.entry(existing).attributes = attributes;
            }
            return Ok(existing);
        }

        let stat = source.stat()?;
        let index = self.slots;
        self.slots += 1;
        self.changes.insert(
            index,
            EntryChange {
                added: true,
                name: Some(name.to_string()),
                attributes: Some(attributes.unwrap_or_else(|| Self::default_attributes(name))),
                modified: Some(stat.mtime.unwrap_or_else(SystemTime::now)),
                compression: Some(self.default_compression),
                content: Some(PendingContent { source, stat }),
                ..Default::default()
            },
        );
        log::debug!("added '{}' at index {}", name, index);
        Ok(index)
    }

    /// Add an entry whose content comes from `source`.
    ///
    /// If a live entry already has this name, `overwrite` replaces its
    /// content; otherwise the call fails with `EntryExists`.
    pub fn add_source(&mut self, name: &str, source: ZipSource, overwrite: bool) -> Result<u64> {
        self.ensure_writable()?;
        Self::validate_name(name)?;
        self.insert_content(name, source, overwrite, None)
    }

    pub fn add_buffer(&mut self, name: &str, data: impl Into<Vec<u8>>, overwrite: bool) -> Result<u64> {
        self.add_source(name, ZipSource::buffer(data), overwrite)
    }

    /// Add a file from disk, named `entry_name` or the file's base name.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        entry_name: Option<&str>,
        overwrite: bool,
    ) -> Result<u64> {
        self.ensure_writable()?;
        let path = path.as_ref();
        let name = match entry_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ZipError::InvalidName {
                    name: path.display().to_string(),
                    reason: "path has no file name",
                })?,
        };
        Self::validate_name(&name)?;

        let source = ZipSource::file(path)?;
        let permissions = match current_platform().get_permissions(path) {
            Ok(mode) => mode,
            Err(e) => {
                log::warn!("cannot read permissions of '{}': {}", path.display(), e);
                0o644
            }
        };
        let attributes = ExternalAttributes::unix(FileType::S_IFREG | permissions);
        self.insert_content(&name, source, overwrite, Some(attributes))
    }

    /// Add a directory entry; a trailing `/` is appended when missing.
    pub fn add_directory(&mut self, name: &str) -> Result<u64> {
        self.ensure_writable()?;
        let trimmed = name.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ZipError::InvalidName {
                name: name.to_string(),
                reason: "name is empty",
            });
        }
        let dir_name = format!("{}/", trimmed);
        Self::validate_name(&dir_name)?;
        if self.find_exact(&dir_name).is_some() {
            return Err(ZipError::EntryExists { name: dir_name });
        }

        let index = self.slots;
        self.slots += 1;
        self.changes.insert(
            index,
            EntryChange {
                added: true,
                attributes: Some(Self::default_attributes(&dir_name)),
                modified: Some(SystemTime::now()),
                compression: Some((CompressionMethod::Store, self.default_compression.1)),
                content: Some(PendingContent {
                    source: ZipSource::buffer(Vec::new()),
                    stat: SourceStat {
                        size: Some(0),
                        mtime: None,
                    },
                }),
                name: Some(dir_name),
                ..Default::default()
            },
        );
        Ok(index)
    }

    // ---- replacing and deleting ----

    /// Give the entry at `index` new content; the previous pending source,
    /// if any, is rolled back.
    pub fn replace_entry(&mut self, index: u64, mut source: ZipSource) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        let stat = source.stat()?;
        let change = self.changes.entry(index);
        change.set_content(PendingContent { source, stat });
        change.modified = Some(stat.mtime.unwrap_or_else(SystemTime::now));
        Ok(())
    }

    pub fn replace_entry_with_file(&mut self, file: impl AsRef<Path>, index: u64) -> bool {
        let result = ZipSource::file(file).and_then(|source| self.replace_entry(index, source));
        self.record_error(result)
    }

    pub fn replace_entry_by_name(
        &mut self,
        file: impl AsRef<Path>,
        name: &str,
        case_sensitive: bool,
    ) -> bool {
        let result = match self.locate_case(name, case_sensitive) {
            Ok(Some(index)) => {
                ZipSource::file(file).and_then(|source| self.replace_entry(index, source))
            }
            Ok(None) => Err(ZipError::EntryNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        };
        self.record_error(result)
    }

    /// Mark the entry deleted. An entry added in this session is dropped.
    pub fn remove(&mut self, index: u64) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        let added = self.changes.get(index).map_or(false, |c| c.added);
        if added {
            self.changes.remove(index);
        } else {
            self.changes.insert(
                index,
                EntryChange {
                    deleted: true,
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    pub fn delete_entry(&mut self, index: u64) -> bool {
        let result = self.remove(index);
        self.record_error(result)
    }

    pub fn delete_entry_by_name(&mut self, name: &str, case_sensitive: bool) -> bool {
        let result = match self.locate_case(name, case_sensitive) {
            Ok(Some(index)) => self.remove(index),
            Ok(None) => Err(ZipError::EntryNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        };
        self.record_error(result)
    }

    // ---- per-entry settings ----

    pub fn rename_entry(&mut self, index: u64, new_name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        Self::validate_name(new_name)?;
        if let Some(other) = self.find_exact(new_name) {
            if other != index {
                return Err(ZipError::EntryExists {
                    name: new_name.to_string(),
                });
            }
        }

        let unchanged = self
            .base_stats
            .get(index as usize)
            .map_or(false, |stat| stat.name == new_name);
        let change = self.changes.entry(index);
        if unchanged && !change.added {
            change.name = None;
        } else {
            change.name = Some(new_name.to_string());
        }
        Ok(())
    }

    pub fn set_entry_compression(
        &mut self,
        index: u64,
        method: CompressionMethod,
        level: CompressionLevel,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        if !method.is_settable() {
            return Err(ZipError::unsupported(format!("compression method {}", method)));
        }
        self.changes.entry(index).compression = Some((method, level));
        Ok(())
    }

    /// Encrypt (or decrypt, with [`EncryptionMethod::None`]) the entry on
    /// commit. Without `password` the archive's default password is used.
    pub fn set_entry_encryption(
        &mut self,
        index: u64,
        method: EncryptionMethod,
        password: Option<&str>,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        if matches!(method, EncryptionMethod::Unknown(_)) || (method.is_aes() && !cfg!(feature = "aes")) {
            return Err(ZipError::unsupported(format!("encryption method {}", method)));
        }
        self.changes.entry(index).encryption = Some(EncryptionChange {
            method,
            password: password.map(|p| Zeroizing::new(p.to_string())),
        });
        Ok(())
    }

    pub fn set_entry_attributes(&mut self, index: u64, attributes: ExternalAttributes) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        self.changes.entry(index).attributes = Some(attributes);
        Ok(())
    }

    pub fn set_entry_modified(&mut self, index: u64, modified: SystemTime) -> Result<()> {
        self.ensure_writable()?;
        self.check_index(index)?;
        self.changes.entry(index).modified = Some(modified);
        Ok(())
    }

    // ---- archive defaults ----

    /// Compression for entries added after this call.
    pub fn set_compression(&mut self, method: CompressionMethod, level: CompressionLevel) -> Result<()> {
        self.ensure_open()?;
        if !method.is_settable() {
            return Err(ZipError::unsupported(format!("compression method {}", method)));
        }
        self.default_compression = (method, level);
        Ok(())
    }

    /// Password used to read encrypted entries and to encrypt entries whose
    /// encryption change carries none.
    pub fn set_default_password(&mut self, password: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        self.default_password = password.map(|p| Zeroizing::new(p.to_string()));
        Ok(())
    }

    /// Observer notified while [`close`](Self::close) writes entries.
    pub fn register_progress(&mut self, reporter: impl ProgressReporter + 'static) {
        self.progress = Some(Box::new(reporter));
    }

    // ---- undo ----

    /// Revert every pending change of one entry.
    pub fn unchange(&mut self, index: u64) -> Result<()> {
        self.ensure_writable()?;
        if index >= self.slots || (index >= self.base_len() && self.changes.get(index).is_none()) {
            return Err(ZipError::NoSuchEntry { index });
        }
        if let Some(stat) = self.base_stats.get(index as usize) {
            if let Some(other) = self.find_exact(&stat.name) {
                if other != index {
                    return Err(ZipError::EntryExists {
                        name: stat.name.clone(),
                    });
                }
            }
        }
        self.changes.remove(index);
        Ok(())
    }

    /// Revert archive-level changes (the comment).
    pub fn unchange_globals(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.changes.comment = None;
        Ok(())
    }

    pub fn unchange_all(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.changes.rollback_all();
        self.slots = self.base_len();
        Ok(())
    }

    // ---- lifecycle ----

    /// Commit pending changes and release the archive.
    ///
    /// On failure nothing on disk changes and the archive stays open with its
    /// changes, so the call can be retried or the archive discarded.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.is_dirty() {
            log::debug!("closing '{}' without changes", self.path.display());
            self.file = None;
            self.state = State::Committed;
            return Ok(());
        }

        self.commit()?;
        self.changes.commit_all();
        self.truncated = false;
        self.file = None;
        self.state = State::Committed;
        Ok(())
    }

    /// Drop every pending change and release the archive.
    pub fn discard(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.is_dirty() {
            log::debug!(
                "discarding {} pending changes to '{}'",
                self.changes.len(),
                self.path.display()
            );
        }
        self.changes.rollback_all();
        self.file = None;
        self.state = State::Discarded;
        Ok(())
    }

    pub fn close_with(&mut self, discard: bool) -> Result<()> {
        if discard {
            self.discard()
        } else {
            self.close()
        }
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if self.state == State::Open {
            if self.is_dirty() {
                log::debug!(
                    "archive '{}' dropped with {} uncommitted changes",
                    self.path.display(),
                    self.changes.len()
                );
            }
            self.changes.rollback_all();
        }
    }
}
