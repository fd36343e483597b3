//! Value types shared by the archive, entry and codec layers.

use std::fmt;
use std::ops::BitOr;

/// Flags controlling how [`Archive::open`](crate::Archive::open) treats the
/// target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct OpenMode(u32);

impl OpenMode {
    pub const NONE: OpenMode = OpenMode(0);
    /// Verify every local header against its central directory record.
    pub const CHECK_CONSISTENCY: OpenMode = OpenMode(1 << 0);
    /// Synthesize an empty archive when the path does not exist.
    pub const CREATE: OpenMode = OpenMode(1 << 1);
    /// With `CREATE`, fail if the path already exists.
    pub const EXCLUSIVE: OpenMode = OpenMode(1 << 2);
    /// Ignore existing content; the first commit rewrites from empty.
    pub const TRUNCATE: OpenMode = OpenMode(1 << 3);
    /// Reject every mutation.
    pub const READ_ONLY: OpenMode = OpenMode(1 << 4);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

/// Name lookup flags for [`Archive::locate`](crate::Archive::locate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct LocateFlags(u32);

impl LocateFlags {
    pub const NONE: LocateFlags = LocateFlags(0);
    pub const CASE_INSENSITIVE: LocateFlags = LocateFlags(1 << 0);
    /// Compare only the final path component of each entry name.
    pub const IGNORE_DIRECTORY: LocateFlags = LocateFlags(1 << 1);

    pub const fn contains(self, other: LocateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LocateFlags {
    type Output = LocateFlags;

    fn bitor(self, rhs: LocateFlags) -> LocateFlags {
        LocateFlags(self.0 | rhs.0)
    }
}

/// Compression method recorded for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum CompressionMethod {
    /// Let the engine choose (deflate for files, store for directories)
    #[default]
    Default,
    Store,
    Deflate,
    Deflate64,
    Bzip2,
    Lzma,
    Other(u16),
}

impl CompressionMethod {
    pub fn from_u16(method: u16) -> Self {
        match method {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            other => CompressionMethod::Other(other),
        }
    }

    /// Numeric method id; `Default` has none until it is resolved.
    pub fn as_u16(self) -> Option<u16> {
        match self {
            CompressionMethod::Default => None,
            CompressionMethod::Store => Some(0),
            CompressionMethod::Deflate => Some(8),
            CompressionMethod::Deflate64 => Some(9),
            CompressionMethod::Bzip2 => Some(12),
            CompressionMethod::Lzma => Some(14),
            CompressionMethod::Other(m) => Some(m),
        }
    }

    /// Methods accepted by `Entry::set_compression`.
    pub fn is_settable(self) -> bool {
        matches!(
            self,
            CompressionMethod::Default
                | CompressionMethod::Store
                | CompressionMethod::Deflate
                | CompressionMethod::Deflate64
        )
    }

    pub fn is_deflate_family(self) -> bool {
        matches!(self, CompressionMethod::Deflate | CompressionMethod::Deflate64)
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Default => f.write_str("default"),
            CompressionMethod::Store => f.write_str("store"),
            CompressionMethod::Deflate => f.write_str("deflate"),
            CompressionMethod::Deflate64 => f.write_str("deflate64"),
            CompressionMethod::Bzip2 => f.write_str("bzip2"),
            CompressionMethod::Lzma => f.write_str("lzma"),
            CompressionMethod::Other(m) => write!(f, "method {}", m),
        }
    }
}

/// Compression level (0-9)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub enum CompressionLevel {
    NoCompression = 0,
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
    Level4 = 4,
    Level5 = 5,
    #[default]
    Level6 = 6,
    Level7 = 7,
    Level8 = 8,
    Level9 = 9,
}

impl CompressionLevel {
    pub const FASTEST: CompressionLevel = CompressionLevel::Level1;
    pub const BEST: CompressionLevel = CompressionLevel::Level9;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(CompressionLevel::NoCompression),
            1 => Some(CompressionLevel::Level1),
            2 => Some(CompressionLevel::Level2),
            3 => Some(CompressionLevel::Level3),
            4 => Some(CompressionLevel::Level4),
            5 => Some(CompressionLevel::Level5),
            6 => Some(CompressionLevel::Level6),
            7 => Some(CompressionLevel::Level7),
            8 => Some(CompressionLevel::Level8),
            9 => Some(CompressionLevel::Level9),
            _ => None,
        }
    }

    /// Level implied by bits 1-2 of the general purpose flags.
    pub fn from_flags(flags: u16) -> Self {
        match (flags >> 1) & 0b11 {
            0 => CompressionLevel::Level6,
            1 => CompressionLevel::Level9,
            2 => CompressionLevel::Level2,
            _ => CompressionLevel::Level1,
        }
    }

    /// Bits 1-2 of the general purpose flags for a deflate entry.
    pub fn to_flags(self) -> u16 {
        match self {
            CompressionLevel::Level8 | CompressionLevel::Level9 => 0b01 << 1,
            CompressionLevel::Level2 => 0b10 << 1,
            CompressionLevel::Level1 => 0b11 << 1,
            _ => 0,
        }
    }
}

/// Entry encryption method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum EncryptionMethod {
    #[default]
    None,
    /// Traditional PKWARE stream cipher
    TradPkware,
    Aes128,
    Aes192,
    Aes256,
    /// Strong encryption or another scheme this crate cannot process
    Unknown(u16),
}

impl EncryptionMethod {
    pub fn is_aes(self) -> bool {
        matches!(
            self,
            EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256
        )
    }

    pub fn is_encrypted(self) -> bool {
        self != EncryptionMethod::None
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionMethod::None => f.write_str("none"),
            EncryptionMethod::TradPkware => f.write_str("zipcrypto"),
            EncryptionMethod::Aes128 => f.write_str("aes-128"),
            EncryptionMethod::Aes192 => f.write_str("aes-192"),
            EncryptionMethod::Aes256 => f.write_str("aes-256"),
            EncryptionMethod::Unknown(id) => write!(f, "unknown({:#06x})", id),
        }
    }
}

/// Host system recorded in the high byte of "version made by".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostSystem {
    Dos,
    Unix,
    Os2,
    Macintosh,
    WindowsNtfs,
    Osx,
    Other(u8),
}

impl HostSystem {
    pub fn from_u8(host: u8) -> Self {
        match host {
            0 => HostSystem::Dos,
            3 => HostSystem::Unix,
            6 => HostSystem::Os2,
            7 => HostSystem::Macintosh,
            10 => HostSystem::WindowsNtfs,
            19 => HostSystem::Osx,
            other => HostSystem::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            HostSystem::Dos => 0,
            HostSystem::Unix => 3,
            HostSystem::Os2 => 6,
            HostSystem::Macintosh => 7,
            HostSystem::WindowsNtfs => 10,
            HostSystem::Osx => 19,
            HostSystem::Other(h) => h,
        }
    }

    /// Hosts whose upper attribute word carries a POSIX mode.
    pub fn is_unix_family(self) -> bool {
        matches!(
            self,
            HostSystem::Unix | HostSystem::Osx | HostSystem::Macintosh
        )
    }

    pub fn is_dos_family(self) -> bool {
        matches!(self, HostSystem::Dos | HostSystem::WindowsNtfs)
    }
}

/// External attributes together with the host that defines their meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalAttributes {
    pub host: HostSystem,
    pub bits: u32,
}

impl ExternalAttributes {
    pub const DOS_DIRECTORY: u32 = 0x10;

    pub fn new(host: HostSystem, bits: u32) -> Self {
        Self { host, bits }
    }

    /// UNIX host with `mode` in the upper word.
    pub fn unix(mode: u32) -> Self {
        let mut bits = (mode & 0xFFFF) << 16;
        if FileType::from_u32(mode) == FileType::Directory {
            bits |= Self::DOS_DIRECTORY;
        }
        Self {
            host: HostSystem::Unix,
            bits,
        }
    }

    pub fn unix_mode(&self) -> u32 {
        self.bits >> 16
    }
}

/// File type in ZIP archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl FileType {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;

    pub fn from_u32(mode: u32) -> Self {
        // Unix file type from mode_t
        match mode & Self::S_IFMT {
            0o010000 => FileType::Fifo,
            0o020000 => FileType::CharDevice,
            0o040000 => FileType::Directory,
            0o060000 => FileType::BlockDevice,
            0o100000 => FileType::File,
            0o120000 => FileType::Symlink,
            0o140000 => FileType::Socket,
            _ => FileType::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
            FileType::BlockDevice => "block_device",
            FileType::CharDevice => "char_device",
            FileType::Fifo => "fifo",
            FileType::Socket => "socket",
        }
    }
}

/// Options for extracting to the filesystem.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub(crate) password: Option<String>,
    pub(crate) overwrite: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            password: None,
            overwrite: true,
        }
    }
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Password for this extraction; falls back to the archive default.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mode_flags() {
        let mode = OpenMode::CREATE | OpenMode::CHECK_CONSISTENCY;
        assert!(mode.contains(OpenMode::CREATE));
        assert!(mode.contains(OpenMode::CHECK_CONSISTENCY));
        assert!(!mode.contains(OpenMode::READ_ONLY));
        assert!(mode.contains(OpenMode::NONE));
    }

    #[test]
    fn test_compression_level_flags() {
        assert_eq!(CompressionLevel::from_flags(0), CompressionLevel::Level6);
        assert_eq!(
            CompressionLevel::from_flags(CompressionLevel::BEST.to_flags()),
            CompressionLevel::Level9
        );
        assert_eq!(
            CompressionLevel::from_flags(CompressionLevel::FASTEST.to_flags()),
            CompressionLevel::Level1
        );
        assert_eq!(CompressionLevel::Level5.to_flags(), 0);
        assert!(CompressionLevel::from_u8(10).is_none());
    }

    #[test]
    fn test_host_system() {
        for host in [0u8, 3, 6, 7, 10, 19, 42] {
            assert_eq!(HostSystem::from_u8(host).as_u8(), host);
        }
        assert!(HostSystem::Osx.is_unix_family());
        assert!(!HostSystem::WindowsNtfs.is_unix_family());
    }

    #[test]
    fn test_unix_attributes() {
        let attrs = ExternalAttributes::unix(0o040755);
        assert_eq!(attrs.unix_mode(), 0o040755);
        assert_eq!(attrs.bits & ExternalAttributes::DOS_DIRECTORY, 0x10);
        let file = ExternalAttributes::unix(0o100644);
        assert_eq!(file.bits & ExternalAttributes::DOS_DIRECTORY, 0);
    }

    #[test]
    fn test_file_type() {
        assert_eq!(FileType::from_u32(0o100644), FileType::File);
        assert_eq!(FileType::from_u32(0o120777), FileType::Symlink);
        assert_eq!(FileType::from_u32(0o040755).as_str(), "directory");
    }
}
