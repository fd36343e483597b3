//! Platform abstraction layer
//!
//! Filesystem attribute handling used when adding files and restoring
//! extracted entries.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Platform-specific operations trait
pub trait Platform {
    /// Get file permissions (Unix mode)
    fn get_permissions(&self, path: &Path) -> std::io::Result<u32>;

    /// Set file permissions
    fn set_permissions(&self, path: &Path, mode: u32) -> std::io::Result<()>;

    /// Set file modification time
    fn set_mtime(&self, path: &Path, mtime: SystemTime) -> std::io::Result<()>;

    /// Create symbolic link
    fn create_symlink(&self, target: &Path, link: &Path) -> std::io::Result<()>;

    /// Whether POSIX permission bits mean anything here
    fn has_posix_permissions(&self) -> bool;
}

/// Unix platform implementation
#[cfg(unix)]
pub struct UnixPlatform;

#[cfg(unix)]
impl Platform for UnixPlatform {
    fn get_permissions(&self, path: &Path) -> std::io::Result<u32> {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::metadata(path)?;
        Ok(meta.mode() & 0o7777)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    fn set_mtime(&self, path: &Path, mtime: SystemTime) -> std::io::Result<()> {
        use std::os::unix::ffi::OsStrExt;

        // times before the epoch are stored as negative seconds
        let (secs, usecs) = match mtime.duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as libc::time_t, d.subsec_micros() as libc::suseconds_t),
            Err(e) => (-(e.duration().as_secs() as libc::time_t), 0),
        };
        let times = [
            libc::timeval {
                tv_sec: secs,
                tv_usec: usecs,
            },
            libc::timeval {
                tv_sec: secs,
                tv_usec: usecs,
            },
        ];
        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains NUL"))?;
        let ret = unsafe { libc::utimes(c_path.as_ptr(), times.as_ptr()) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> std::io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn has_posix_permissions(&self) -> bool {
        true
    }
}

/// Windows platform implementation
#[cfg(windows)]
pub struct WindowsPlatform;

#[cfg(windows)]
impl Platform for WindowsPlatform {
    fn get_permissions(&self, path: &Path) -> std::io::Result<u32> {
        // Windows only has a readonly flag
        let readonly = std::fs::metadata(path)?.permissions().readonly();
        Ok(if readonly { 0o444 } else { 0o644 })
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> std::io::Result<()> {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        std::fs::set_permissions(path, perms)
    }

    fn set_mtime(&self, path: &Path, mtime: SystemTime) -> std::io::Result<()> {
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Foundation::{CloseHandle, FILETIME, HANDLE, INVALID_HANDLE_VALUE};
        use windows_sys::Win32::Storage::FileSystem::{
            CreateFileW, SetFileTime, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_BACKUP_SEMANTICS,
            FILE_SHARE_READ, FILE_SHARE_WRITE, FILE_WRITE_ATTRIBUTES, OPEN_EXISTING,
        };

        let duration = mtime
            .duration_since(UNIX_EPOCH)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "mtime before epoch"))?;
        let ticks = duration.as_secs() * 10_000_000 + u64::from(duration.subsec_nanos()) / 100;
        let ft = ticks
            .checked_add(11_644_473_600 * 10_000_000)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "mtime overflow"))?;

        let filetime = FILETIME {
            dwLowDateTime: ft as u32,
            dwHighDateTime: (ft >> 32) as u32,
        };

        let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
        wide.push(0);

        let handle: HANDLE = unsafe {
            CreateFileW(
                wide.as_ptr(),
                FILE_WRITE_ATTRIBUTES,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL | FILE_FLAG_BACKUP_SEMANTICS,
                0,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(std::io::Error::last_os_error());
        }

        let ok = unsafe { SetFileTime(handle, std::ptr::null(), std::ptr::null(), &filetime) };
        unsafe { CloseHandle(handle) };
        if ok == 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn create_symlink(&self, _target: &Path, _link: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks not supported on Windows",
        ))
    }

    fn has_posix_permissions(&self) -> bool {
        false
    }
}

/// Generic platform implementation for other OSes
#[cfg(not(any(unix, windows)))]
pub struct GenericPlatform;

#[cfg(not(any(unix, windows)))]
impl Platform for GenericPlatform {
    fn get_permissions(&self, _path: &Path) -> std::io::Result<u32> {
        Ok(0o644)
    }

    fn set_permissions(&self, _path: &Path, _mode: u32) -> std::io::Result<()> {
        Ok(())
    }

    fn set_mtime(&self, _path: &Path, _mtime: SystemTime) -> std::io::Result<()> {
        Ok(())
    }

    fn create_symlink(&self, _target: &Path, _link: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks not supported",
        ))
    }

    fn has_posix_permissions(&self) -> bool {
        false
    }
}

/// Get the platform implementation for the current OS
pub fn current_platform() -> &'static impl Platform {
    #[cfg(unix)]
    {
        static PLATFORM: UnixPlatform = UnixPlatform;
        &PLATFORM
    }

    #[cfg(windows)]
    {
        static PLATFORM: WindowsPlatform = WindowsPlatform;
        &PLATFORM
    }

    #[cfg(not(any(unix, windows)))]
    {
        static PLATFORM: GenericPlatform = GenericPlatform;
        &PLATFORM
    }
}
