//! Entry metadata snapshots.

use crate::entry::name::decode_name;
use crate::types::{
    CompressionLevel, CompressionMethod, EncryptionMethod, ExternalAttributes, FileType,
    HostSystem,
};
use crate::zip::format::DirectoryRecord;
use std::time::SystemTime;

/// Permission reported for entries whose host does not record POSIX modes.
pub const DEFAULT_POSIX_PERMISSION: u32 = 0o644;

/// Raw metadata of one entry at a point in the archive's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub index: u64,
    /// Decoded name
    pub name: String,
    /// Name bytes as stored
    pub raw_name: Vec<u8>,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub modified: SystemTime,
    pub compression_method: CompressionMethod,
    pub encryption_method: EncryptionMethod,
    pub external_attributes: ExternalAttributes,
    /// General purpose bit flags
    pub flags: u16,
}

impl EntryStat {
    pub(crate) fn from_record(index: u64, record: &DirectoryRecord) -> Self {
        let host = record.host();
        Self {
            index,
            name: decode_name(&record.name, record.flags, host),
            raw_name: record.name.clone(),
            compressed_size: record.compressed_size,
            uncompressed_size: record.uncompressed_size,
            crc32: record.crc32,
            modified: record.modified(),
            compression_method: record.compression_method(),
            encryption_method: record.encryption_method(),
            external_attributes: ExternalAttributes::new(host, record.external_attr),
            flags: record.flags,
        }
    }
}

/// Normalized view of an entry.
///
/// `is_directory` and the POSIX fields are derived from the external
/// attributes according to the host that wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub index: u64,
    pub name: String,
    pub raw_name: Vec<u8>,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub posix_permission: u32,
    pub file_type: FileType,
    pub external_attributes: ExternalAttributes,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub modified: SystemTime,
    pub compression_method: CompressionMethod,
    /// Only for deflate-family methods
    pub compression_level: Option<CompressionLevel>,
    pub encryption_method: EncryptionMethod,
}

impl From<EntryStat> for EntryInfo {
    fn from(stat: EntryStat) -> Self {
        let attrs = stat.external_attributes;
        let is_directory = is_directory(&stat.name, attrs);
        let unix_mode = attrs.unix_mode();
        let posix = attrs.host.is_unix_family() && unix_mode != 0;

        let is_symlink = posix && FileType::from_u32(unix_mode) == FileType::Symlink;
        let posix_permission = if posix {
            unix_mode & 0o7777
        } else {
            DEFAULT_POSIX_PERMISSION
        };
        let file_type = if is_directory {
            FileType::Directory
        } else if posix {
            FileType::from_u32(unix_mode)
        } else {
            FileType::File
        };

        let compression_level = if stat.compression_method.is_deflate_family() {
            Some(CompressionLevel::from_flags(stat.flags))
        } else {
            None
        };

        Self {
            index: stat.index,
            name: stat.name,
            raw_name: stat.raw_name,
            is_directory,
            is_symlink,
            posix_permission,
            file_type,
            external_attributes: attrs,
            compressed_size: stat.compressed_size,
            uncompressed_size: stat.uncompressed_size,
            crc32: stat.crc32,
            modified: stat.modified,
            compression_method: stat.compression_method,
            compression_level,
            encryption_method: stat.encryption_method,
        }
    }
}

/// Without attribute bits the trailing `/` decides; DOS hosts use the
/// directory bit; UNIX-family hosts use the mode's file type when present.
pub(crate) fn is_directory(name: &str, attrs: ExternalAttributes) -> bool {
    if attrs.bits == 0 {
        return name.ends_with('/');
    }
    let unix_mode = attrs.unix_mode();
    match attrs.host {
        HostSystem::Dos | HostSystem::WindowsNtfs => {
            attrs.bits & ExternalAttributes::DOS_DIRECTORY != 0
        }
        host if host.is_unix_family() && unix_mode != 0 => {
            FileType::from_u32(unix_mode) == FileType::Directory
        }
        _ => attrs.bits & ExternalAttributes::DOS_DIRECTORY != 0,
    }
}
