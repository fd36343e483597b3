//! 条目提取到内存、写入器或文件系统

use crate::archive::Archive;
use crate::entry::stat::EntryInfo;
use crate::error::{Result, ZipError};
use crate::platform::{current_platform, Platform};
use crate::progress::{fraction, ExtractAllProgress, ExtractProgress};
use crate::types::ExtractOptions;
use crate::zip::codec::classify;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// 每次读取的块大小
const CHUNK_SIZE: usize = 80 * 1024;

/// 分块复制并报告进度；回调返回 false 时停止并返回 `Cancelled`
fn copy_with_progress<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    name: &str,
    total: u64,
    progress: &mut dyn ExtractProgress,
    write_error: F,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: Fn(io::Error) -> ZipError,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut done = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify(e, name)),
        };
        writer.write_all(&buf[..n]).map_err(&write_error)?;
        done += n as u64;
        if !progress.on_progress(name, fraction(done, total)) {
            return Err(ZipError::Cancelled);
        }
    }
    writer.flush().map_err(&write_error)?;
    Ok(done)
}

/// 将条目名转换为相对路径，拒绝绝对路径与 `..`
fn safe_relative_path(name: &str) -> Result<PathBuf> {
    let invalid = |reason: &'static str| ZipError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(invalid("absolute path"));
    }

    let mut path = PathBuf::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid("path escapes the destination")),
            _ => {}
        }
        // C:、UNC 前缀等
        if Path::new(part)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
            || part.contains(':')
        {
            return Err(invalid("absolute path"));
        }
        path.push(part);
    }
    if path.as_os_str().is_empty() {
        return Err(invalid("name has no path components"));
    }
    Ok(path)
}

fn restore_mtime(path: &Path, modified: SystemTime) -> Result<()> {
    current_platform()
        .set_mtime(path, modified)
        .map_err(|e| ZipError::SetMtimeFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// 恢复权限（仅 Unix 系列主机记录的权限）与修改时间
fn restore_attributes(path: &Path, info: &EntryInfo) -> Result<()> {
    let platform = current_platform();
    if info.external_attributes.host.is_unix_family()
        && info.external_attributes.unix_mode() != 0
        && platform.has_posix_permissions()
    {
        platform
            .set_permissions(path, info.posix_permission)
            .map_err(|e| ZipError::SetPermFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }
    restore_mtime(path, info.modified)
}

#[cfg(unix)]
fn create_symlink(target: &[u8], path: &Path) -> Result<()> {
    use std::os::unix::ffi::OsStrExt;
    let target = Path::new(std::ffi::OsStr::from_bytes(target));
    current_platform()
        .create_symlink(target, path)
        .map_err(|e| ZipError::file_write(path, e))
}

#[cfg(not(unix))]
fn create_symlink(_target: &[u8], _path: &Path) -> Result<()> {
    Err(ZipError::unsupported("symbolic links"))
}

impl Archive {
    pub(crate) fn extract_entry_to_writer<W: Write + ?Sized>(
        &mut self,
        index: u64,
        writer: &mut W,
        password: Option<&str>,
        progress: &mut dyn ExtractProgress,
    ) -> Result<u64> {
        let info = EntryInfo::from(self.stat(index)?);
        if !progress.on_progress(&info.name, 0.0) {
            return Err(ZipError::Cancelled);
        }
        if info.is_directory {
            return Ok(0);
        }
        let mut reader = self.open_entry(index, password)?;
        copy_with_progress(
            &mut reader,
            writer,
            &info.name,
            info.uncompressed_size,
            progress,
            ZipError::Io,
        )
    }

    pub(crate) fn extract_entry_to_path(
        &mut self,
        index: u64,
        path: &Path,
        options: &ExtractOptions,
        progress: &mut dyn ExtractProgress,
    ) -> Result<()> {
        let info = EntryInfo::from(self.stat(index)?);
        if !progress.on_progress(&info.name, 0.0) {
            return Err(ZipError::Cancelled);
        }

        let existing = fs::symlink_metadata(path).ok();
        if existing.is_some() && !options.overwrite {
            return Err(ZipError::OverwriteConflict {
                path: path.to_path_buf(),
            });
        }

        if info.is_directory {
            fs::create_dir_all(path).map_err(|e| ZipError::CreateDirFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            if let Err(e) = restore_mtime(path, info.modified) {
                log::warn!("{}", e);
            }
            if !progress.on_progress(&info.name, 1.0) {
                return Err(ZipError::Cancelled);
            }
            return Ok(());
        }

        // 先打开条目：密码错误时不会留下空文件
        let mut reader = self.open_entry(index, options.password.as_deref())?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ZipError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        // 不跟随已存在的符号链接写入
        if existing.map_or(false, |m| m.file_type().is_symlink()) {
            fs::remove_file(path).map_err(|e| ZipError::file_write(path, e))?;
        }

        if info.is_symlink && cfg!(unix) {
            let mut target = Vec::new();
            copy_with_progress(
                &mut reader,
                &mut target,
                &info.name,
                info.uncompressed_size,
                progress,
                ZipError::Io,
            )?;
            drop(reader);
            if path.exists() {
                fs::remove_file(path).map_err(|e| ZipError::file_write(path, e))?;
            }
            return create_symlink(&target, path);
        }

        let file = File::create(path).map_err(|e| ZipError::file_write(path, e))?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let copied = copy_with_progress(
            &mut reader,
            &mut writer,
            &info.name,
            info.uncompressed_size,
            progress,
            |e| ZipError::file_write(path, e),
        );
        drop(writer);
        drop(reader);

        match copied {
            Ok(_) => {}
            // 取消时保留已写出的部分
            Err(ZipError::Cancelled) => return Err(ZipError::Cancelled),
            Err(e) => {
                if let Err(rm) = fs::remove_file(path) {
                    log::warn!("cannot remove incomplete '{}': {}", path.display(), rm);
                }
                return Err(e);
            }
        }

        restore_attributes(path, &info)
    }

    /// Extract every live entry below `dir`.
    ///
    /// Names are checked before anything is written: absolute names and
    /// names containing `..` fail with `InvalidName`. The observer receives
    /// `(entry_name, entry_fraction, total_fraction)` and may cancel; after
    /// the last entry it is called once more with `("", 0.0, 1.0)`.
    pub fn extract_all(
        &mut self,
        dir: impl AsRef<Path>,
        options: &ExtractOptions,
        mut progress: impl ExtractAllProgress,
    ) -> Result<()> {
        let dir = dir.as_ref();
        let entries = self.get_entries()?;
        let targets = entries
            .iter()
            .map(|info| safe_relative_path(&info.name).map(|rel| dir.join(rel)))
            .collect::<Result<Vec<_>>>()?;

        fs::create_dir_all(dir).map_err(|e| ZipError::CreateDirFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let count = entries.len() as f64;
        let mut directories = Vec::new();
        for (k, (info, target)) in entries.iter().zip(&targets).enumerate() {
            let mut per_entry = |name: &str, f: f64| {
                progress.on_progress(name, f, (k as f64 + f) / count)
            };
            self.extract_entry_to_path(info.index, target, options, &mut per_entry)?;
            if info.is_directory {
                directories.push((target, info.modified));
            }
        }

        // 写入子项会改变目录的修改时间
        for (path, modified) in directories.into_iter().rev() {
            if let Err(e) = restore_mtime(path, modified) {
                log::warn!("{}", e);
            }
        }

        progress.on_progress("", 0.0, 1.0);
        Ok(())
    }
}
