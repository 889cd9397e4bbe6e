use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, SuiteError};

/// The volume under test. Read-only to the core for the whole run.
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    root_path: PathBuf,
    total_bytes: u64,
    free_bytes: u64,
    live: bool,
}

impl DeviceTarget {
    /// A target with a fixed capacity snapshot, as reported by whoever
    /// enumerated the device.
    pub fn new(root_path: impl Into<PathBuf>, total_bytes: u64, free_bytes: u64) -> Self {
        DeviceTarget {
            root_path: root_path.into(),
            total_bytes,
            free_bytes,
            live: false,
        }
    }

    /// Query the OS for capacity. Free space is re-queried on every
    /// [`free_bytes_now`](Self::free_bytes_now) call afterwards.
    pub fn probe(root_path: impl Into<PathBuf>) -> Result<Self> {
        let root_path = root_path.into();
        let (total_bytes, free_bytes) =
            volume_space(&root_path).map_err(|e| SuiteError::io(&root_path, e))?;
        Ok(DeviceTarget {
            root_path,
            total_bytes,
            free_bytes,
            live: true,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Free bytes as of construction.
    pub fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    /// Free bytes right now; the snapshot value for non-live targets.
    pub fn free_bytes_now(&self) -> Result<u64> {
        if !self.live {
            return Ok(self.free_bytes);
        }
        volume_space(&self.root_path)
            .map(|(_, free)| free)
            .map_err(|e| SuiteError::io(&self.root_path, e))
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// `(total, available)` bytes for the filesystem holding `path`.
pub fn volume_space(path: &Path) -> io::Result<(u64, u64)> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            unix_space(path)
        } else if #[cfg(windows)] {
            windows_space(path)
        } else {
            let _ = path;
            Err(io::Error::new(io::ErrorKind::Unsupported, "OS-unsupported"))
        }
    }
}

#[cfg(unix)]
fn unix_space(path: &Path) -> io::Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path = if path.as_os_str().is_empty() { Path::new(".") } else { path };
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid path for CString: {}", e))
    })?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat as *mut _) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let frsize = stat.f_frsize as u64;
    Ok((stat.f_blocks as u64 * frsize, stat.f_bavail as u64 * frsize))
}

#[cfg(windows)]
fn windows_space(path: &Path) -> io::Result<(u64, u64)> {
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::fileapi::GetDiskFreeSpaceExW;
    use winapi::um::winnt::ULARGE_INTEGER;

    if !path.exists() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "path does not exist"));
    }
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if wide.last() != Some(&0) {
        wide.push(0);
    }
    let mut free_available: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
    let mut total: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
    let mut total_free: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
    if unsafe {
        GetDiskFreeSpaceExW(wide.as_ptr(), &mut free_available, &mut total, &mut total_free)
    } == 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { (*total.QuadPart(), *free_available.QuadPart()) })
}

pub fn format_bytes(bytes: u64) -> (f64, &'static str) {
    const KIB_F: f64 = 1024.0;
    const MIB_F: f64 = KIB_F * 1024.0;
    const GIB_F: f64 = MIB_F * 1024.0;
    const TIB_F: f64 = GIB_F * 1024.0;
    if bytes < 1024 {
        return (bytes as f64, "Bytes");
    }
    let bytes_f = bytes as f64;
    if bytes_f < MIB_F {
        (bytes_f / KIB_F, "KiB")
    } else if bytes_f < GIB_F {
        (bytes_f / MIB_F, "MiB")
    } else if bytes_f < TIB_F {
        (bytes_f / GIB_F, "GiB")
    } else {
        (bytes_f / TIB_F, "TiB")
    }
}
