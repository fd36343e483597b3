//! ziprw - transactional ZIP archive editing
//!
//! An [`Archive`] is opened from a path, edited through a change log and
//! written back in one atomic step when it is closed. Nothing touches the
//! file on disk until [`Archive::close`]; [`Archive::discard`] (or simply
//! dropping the handle) leaves the original untouched.
//!
//! ## 功能
//!
//! - 读取 STORE / DEFLATE 条目，校验 CRC 与长度
//! - 添加、替换、重命名、删除条目，可逐条撤销
//! - ZipCrypto 与 WinZip AES（128/192/256）加解密
//! - DOS / Unix 属性、修改时间与名称编码（UTF-8 / CP437）
//! - 解压到内存、写入器或文件系统，支持进度回调与取消
//!
//! ## 示例
//!
//! ```no_run
//! use ziprw::{Archive, ExtractOptions, OpenMode};
//!
//! let mut archive = Archive::open("photos.zip", OpenMode::NONE)?;
//! for info in archive.get_entries()? {
//!     println!("{} ({} bytes)", info.name, info.uncompressed_size);
//! }
//! archive.extract_all("out", &ExtractOptions::new(), |_: &str, _: f64, _: f64| true)?;
//! archive.close()?;
//! # Ok::<(), ziprw::ZipError>(())
//! ```

pub mod archive;
pub mod entry;
pub mod error;
pub mod platform;
pub mod progress;
pub mod source;
pub mod types;
pub mod unzip;
pub mod zip;

pub use archive::Archive;
pub use entry::{Entry, EntryInfo, EntryStat};
pub use error::{Result, ZipError, ZipErrorCode};
pub use progress::{ExtractAllProgress, ExtractProgress, NoProgress, ProgressReporter};
pub use source::{SourceCallback, SourceReader, SourceStat, ZipSource};
pub use types::{
    CompressionLevel, CompressionMethod, EncryptionMethod, ExternalAttributes, ExtractOptions,
    FileType, HostSystem, LocateFlags, OpenMode,
};
pub use unzip::EntryReader;
pub use zip::codec::StreamFault;

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether the file at `path` starts with a ZIP signature.
///
/// Only the first four bytes are inspected. Files shorter than that, and
/// files that cannot be opened, are not archives.
pub fn is_zip_archive(path: impl AsRef<Path>) -> bool {
    let mut prefix = [0u8; 4];
    match File::open(path.as_ref()) {
        Ok(mut file) => file.read_exact(&mut prefix).is_ok() && zip::reader::has_zip_signature(&prefix),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_is_zip_archive_missing_file() {
        assert!(!is_zip_archive("/nonexistent/definitely/not/here.zip"));
    }
}
