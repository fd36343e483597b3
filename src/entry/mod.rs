//! Entry handles and metadata.

pub(crate) mod name;
pub(crate) mod stat;

pub use self::stat::{EntryInfo, EntryStat, DEFAULT_POSIX_PERMISSION};

use crate::archive::Archive;
use crate::error::Result;
use crate::progress::ExtractProgress;
use crate::source::ZipSource;
use crate::types::{
    CompressionLevel, CompressionMethod, EncryptionMethod, ExternalAttributes, ExtractOptions,
    HostSystem,
};
use crate::unzip::reader::EntryReader;
use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use std::time::SystemTime;

/// One entry of an open archive.
///
/// Dereferences to the entry's [`EntryInfo`], refreshed after every change
/// made through the handle.
#[derive(Debug)]
pub struct Entry<'a> {
    archive: &'a mut Archive,
    info: EntryInfo,
}

impl<'a> Deref for Entry<'a> {
    type Target = EntryInfo;

    fn deref(&self) -> &EntryInfo {
        &self.info
    }
}

impl<'a> Entry<'a> {
    pub(crate) fn new(archive: &'a mut Archive, info: EntryInfo) -> Self {
        Self { archive, info }
    }

    pub fn info(&self) -> &EntryInfo {
        &self.info
    }

    /// Raw metadata, pending changes applied.
    pub fn stat(&self) -> Result<EntryStat> {
        self.archive.stat(self.info.index)
    }

    fn refresh(&mut self) -> Result<()> {
        self.info = EntryInfo::from(self.archive.stat(self.info.index)?);
        Ok(())
    }

    fn apply(&mut self, result: Result<()>) -> Result<()> {
        result?;
        self.refresh()
    }

    /// Boolean form: the error is kept in [`Archive::last_error`].
    fn apply_bool(&mut self, result: Result<()>) -> bool {
        match self.apply(result) {
            Ok(()) => true,
            Err(e) => {
                self.archive.set_last_error(e);
                false
            }
        }
    }

    pub fn rename(&mut self, new_name: &str) -> bool {
        let result = self.archive.rename_entry(self.info.index, new_name);
        self.apply_bool(result)
    }

    pub fn set_compression(&mut self, method: CompressionMethod, level: CompressionLevel) -> Result<()> {
        let result = self.archive.set_entry_compression(self.info.index, method, level);
        self.apply(result)
    }

    /// Encrypt with the archive's default password on commit.
    pub fn set_encryption(&mut self, method: EncryptionMethod) -> bool {
        let result = self.archive.set_entry_encryption(self.info.index, method, None);
        self.apply_bool(result)
    }

    pub fn set_encryption_with_password(&mut self, method: EncryptionMethod, password: &str) -> Result<()> {
        let result = self
            .archive
            .set_entry_encryption(self.info.index, method, Some(password));
        self.apply(result)
    }

    pub fn set_external_attributes(&mut self, host: HostSystem, bits: u32) -> Result<()> {
        let result = self
            .archive
            .set_entry_attributes(self.info.index, ExternalAttributes::new(host, bits));
        self.apply(result)
    }

    pub fn set_modified(&mut self, modified: SystemTime) -> Result<()> {
        let result = self.archive.set_entry_modified(self.info.index, modified);
        self.apply(result)
    }

    /// New content; reads through this handle see it before commit.
    pub fn replace(&mut self, source: ZipSource) -> Result<()> {
        let result = self.archive.replace_entry(self.info.index, source);
        self.apply(result)
    }

    pub fn delete(&mut self) -> bool {
        match self.archive.remove(self.info.index) {
            Ok(()) => true,
            Err(e) => {
                self.archive.set_last_error(e);
                false
            }
        }
    }

    /// Revert the pending changes of this entry.
    pub fn discard_change(&mut self) -> bool {
        let result = self.archive.unchange(self.info.index);
        self.apply_bool(result)
    }

    /// Streaming reader over the entry's content.
    pub fn open(&mut self, password: Option<&str>) -> Result<EntryReader<'_>> {
        self.archive.open_entry(self.info.index, password)
    }

    pub fn extract_to_vec(&mut self, password: Option<&str>) -> Result<Vec<u8>> {
        if self.info.is_directory {
            return Ok(Vec::new());
        }
        self.open(password)?.read_all()
    }

    /// Copy the content into `writer`, returning the number of bytes.
    pub fn extract_to_writer<W: Write>(
        &mut self,
        writer: &mut W,
        password: Option<&str>,
        mut progress: impl ExtractProgress,
    ) -> Result<u64> {
        self.archive
            .extract_entry_to_writer(self.info.index, writer, password, &mut progress)
    }

    /// Create the file or directory at `path` and restore its attributes.
    pub fn extract_to_path(
        &mut self,
        path: impl AsRef<Path>,
        options: &ExtractOptions,
        mut progress: impl ExtractProgress,
    ) -> Result<()> {
        self.archive
            .extract_entry_to_path(self.info.index, path.as_ref(), options, &mut progress)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ZipError;
    use crate::progress::NoProgress;
    use crate::source::ZipSource;
    use crate::{Archive, OpenMode};
    use tempfile::TempDir;

    #[test]
    fn test_entry_reflects_pending_changes() {
        let tmp = TempDir::new().unwrap();
        let mut archive = Archive::open(tmp.path().join("e.zip"), OpenMode::CREATE).unwrap();
        let index = archive.add_buffer("old.txt", b"v1".to_vec(), false).unwrap();

        let mut entry = archive.read_entry(index).unwrap();
        assert!(entry.rename("new.txt"));
        assert_eq!(entry.name, "new.txt");

        entry.replace(ZipSource::buffer(b"version two".to_vec())).unwrap();
        assert_eq!(entry.uncompressed_size, 11);
        assert_eq!(entry.extract_to_vec(None).unwrap(), b"version two");

        let mut sink = Vec::new();
        let n = entry.extract_to_writer(&mut sink, None, NoProgress).unwrap();
        assert_eq!(n, 11);
        assert_eq!(sink, b"version two");
    }

    #[test]
    fn test_metadata_setters_and_discard() {
        use crate::types::{EncryptionMethod, HostSystem};
        use std::time::{Duration, UNIX_EPOCH};

        let tmp = TempDir::new().unwrap();
        let mut archive = Archive::open(tmp.path().join("e.zip"), OpenMode::CREATE).unwrap();
        let index = archive.add_buffer("tool", b"x".to_vec(), false).unwrap();
        archive.close().unwrap();

        let mut archive = Archive::open(tmp.path().join("e.zip"), OpenMode::NONE).unwrap();
        let when = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        {
            let mut entry = archive.read_entry(index).unwrap();
            entry.set_modified(when).unwrap();
            entry.set_external_attributes(HostSystem::Dos, 0x10).unwrap();
            assert!(entry.is_directory);
            assert_eq!(entry.modified, when);

            // no default password yet, still recorded
            assert!(entry.set_encryption(EncryptionMethod::TradPkware));
            assert_eq!(entry.encryption_method, EncryptionMethod::TradPkware);

            assert!(entry.discard_change());
            assert!(!entry.is_directory);
            assert_eq!(entry.encryption_method, EncryptionMethod::None);
            assert!(entry.delete());
        }
        assert_eq!(archive.entry_count().unwrap(), 0);
        assert!(archive.is_dirty());
    }

    #[test]
    fn test_rename_to_empty_records_error() {
        let tmp = TempDir::new().unwrap();
        let mut archive = Archive::open(tmp.path().join("e.zip"), OpenMode::CREATE).unwrap();
        let index = archive.add_buffer("a.txt", Vec::new(), false).unwrap();
        {
            let mut entry = archive.read_entry(index).unwrap();
            assert!(!entry.rename(""));
        }
        assert!(matches!(
            archive.take_last_error(),
            Some(ZipError::InvalidName { .. })
        ));
    }
}
