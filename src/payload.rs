//! Random payloads, SHA-256 digests, and the per-module records that tie a
//! written artifact to what it should read back as.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{at, Result, SuiteError};

const HASH_BUF: usize = 64 * 1024;

pub type Sha256Digest = [u8; 32];

pub fn hex(digest: &Sha256Digest) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    thread_rng().fill_bytes(&mut buf);
    buf
}

/// Write `size` random bytes to `path`, hashing them on the way out, and
/// close the file. Returns the digest of what was written.
pub fn write_random_file(path: &Path, size: u64) -> Result<Sha256Digest> {
    let file = File::create(path).map_err(at(path))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut rng = thread_rng();
    let mut chunk = vec![0u8; HASH_BUF.min(size.max(1) as usize)];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(chunk.len() as u64) as usize;
        rng.fill_bytes(&mut chunk[..n]);
        writer.write_all(&chunk[..n]).map_err(at(path))?;
        hasher.update(&chunk[..n]);
        remaining -= n as u64;
    }
    writer.flush().map_err(at(path))?;
    Ok(hasher.finalize().into())
}

/// Stream `path` through SHA-256.
pub fn hash_file(path: &Path) -> Result<Sha256Digest> {
    let mut file = File::open(path).map_err(|e| missing_or_io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF];
    loop {
        let n = file.read(&mut buf).map_err(at(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

fn missing_or_io(path: &Path, e: std::io::Error) -> SuiteError {
    if e.kind() == ErrorKind::NotFound {
        SuiteError::MissingFile { path: path.to_path_buf() }
    } else {
        SuiteError::io(path, e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Sha256(Sha256Digest),
    Length(u64),
}

/// One artifact written during a module run and what it must read back as.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub expected: Expectation,
}

impl FileRecord {
    /// Create `path` with `size` random bytes and remember its digest.
    pub fn write_hashed(path: PathBuf, size: u64) -> Result<Self> {
        let digest = write_random_file(&path, size)?;
        Ok(FileRecord {
            path,
            expected: Expectation::Sha256(digest),
        })
    }

    /// Re-open the artifact and compare it against the expectation.
    pub fn verify(&self) -> Result<()> {
        match &self.expected {
            Expectation::Sha256(expected) => {
                if !self.path.exists() {
                    return Err(SuiteError::MissingFile { path: self.path.clone() });
                }
                let actual = hash_file(&self.path)?;
                if &actual != expected {
                    return Err(SuiteError::VerificationMismatch {
                        path: self.path.clone(),
                        expected: hex(expected),
                        actual: hex(&actual),
                    });
                }
            }
            Expectation::Length(expected) => {
                let data = fs::read(&self.path).map_err(|e| missing_or_io(&self.path, e))?;
                if data.len() as u64 != *expected {
                    return Err(SuiteError::LengthMismatch {
                        path: self.path.clone(),
                        expected: *expected,
                        actual: data.len() as u64,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
