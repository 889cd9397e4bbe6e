use std::{io, path::PathBuf};

/// OS error code for "file exceeds the filesystem's maximum file size".
#[cfg(not(windows))]
const EFBIG: i32 = libc::EFBIG;
#[cfg(windows)]
const EFBIG: i32 = 223; // ERROR_FILE_TOO_LARGE

#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("insufficient space on target: need {needed} bytes, {available} available")]
    InsufficientSpace { needed: u64, available: u64 },
    #[error("permission denied at {}: {source}; run with elevated privileges or check the write-protect switch", .path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },
    #[error("file too large for target filesystem at {}: {source}; the volume may be FAT32 (4 GiB limit), consider exFAT or NTFS", .path.display())]
    FileTooLarge { path: PathBuf, source: io::Error },
    #[error("hash mismatch for {}: expected {expected}, got {actual}", .path.display())]
    VerificationMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("length mismatch for {}: expected {expected} bytes, got {actual}", .path.display())]
    LengthMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("file missing: {}", .path.display())]
    MissingFile { path: PathBuf },
    #[error("staging directory is not configured")]
    StagingNotConfigured,
    #[error("staging directory {} unavailable: {source}", .path.display())]
    StagingUnavailable { path: PathBuf, source: io::Error },
    #[error("write probe failed at {}: {reason}", .path.display())]
    WriteProbeFailed { path: PathBuf, reason: String },
    #[error("unknown test: {0}")]
    UnknownTest(String),
}

pub type Result<T> = std::result::Result<T, SuiteError>;

impl SuiteError {
    /// Attach `path` to a raw I/O error, promoting the kinds that need a
    /// distinct operator hint.
    pub fn io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::PermissionDenied {
            return SuiteError::PermissionDenied { path, source: err };
        }
        if err.raw_os_error() == Some(EFBIG) {
            return SuiteError::FileTooLarge { path, source: err };
        }
        SuiteError::Io(io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

/// `map_err` helper: `file.write_all(buf).map_err(at(&path))?`.
pub(crate) fn at(path: &std::path::Path) -> impl Fn(io::Error) -> SuiteError + '_ {
    move |e| SuiteError::io(path, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_carries_elevation_hint() {
        let err = SuiteError::io(
            "/mnt/usb/USBTestData/a.bin",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SuiteError::PermissionDenied { .. }));
        assert!(err.to_string().contains("elevated privileges"));
    }

    #[test]
    fn efbig_maps_to_file_too_large() {
        let err = SuiteError::io("/mnt/usb/big.dat", io::Error::from_raw_os_error(EFBIG));
        assert!(matches!(err, SuiteError::FileTooLarge { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn platform_efbig_carries_filesystem_hint() {
        let err = SuiteError::io("/mnt/usb/big.dat", io::Error::from_raw_os_error(libc::EFBIG));
        assert!(matches!(err, SuiteError::FileTooLarge { .. }));
        assert!(err.to_string().contains("FAT32"));
    }

    #[test]
    fn plain_errors_keep_path_context() {
        let err = SuiteError::io("/mnt/usb/x", io::Error::new(io::ErrorKind::Other, "boom"));
        let text = err.to_string();
        assert!(text.contains("/mnt/usb/x"));
        assert!(text.contains("boom"));
    }
}
