//! Sequential throughput over a large payload.
//!
//! The payload is generated in the suite's own subdirectory of an external
//! staging directory first, then transferred to the device. Write time runs from the start of the transfer
//! to the confirmed sync of the target file; read time is a separate
//! interval covering a full sequential read-back in small chunks. Payloads
//! above the legacy single-file ceiling are copied in fixed chunks with a
//! flush and sync after each one.
//!
//! Blocking I/O is never interrupted: a hung device call holds this thread
//! until the OS returns.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use rand::{thread_rng, RngCore};
use serde_json::json;

use crate::config::{SuiteConfig, GIB, MIB};
use crate::device_target::{format_bytes, DeviceTarget};
use crate::error::{at, Result, SuiteError};
use crate::modules::{ensure_test_root, TestModule, TestOutcome};
use crate::sink::MessageSink;

const SOURCE_FILE_NAME: &str = "perf_test_source.dat";
const TARGET_FILE_NAME: &str = "perf_test.dat";
const PROBE_FILE_NAME: &str = "test_small.tmp";
const PROBE_PATTERN: &[u8] = b"Test data for USB write verification";
const PROBE_REPEAT: usize = 1000;
const STAGING_PROGRESS_BYTES: u64 = 100 * MIB;

/// Measured throughput of one run.
#[derive(Debug, Clone)]
pub struct PerformanceReport {
    pub bytes: u64,
    pub chunked: bool,
    pub write_seconds: f64,
    pub read_seconds: f64,
    pub write_mib_s: f64,
    pub read_mib_s: f64,
}

impl PerformanceReport {
    fn new(bytes: u64, chunked: bool, write_seconds: f64, read_seconds: f64) -> Self {
        PerformanceReport {
            bytes,
            chunked,
            write_seconds,
            read_seconds,
            write_mib_s: throughput_mib_s(bytes, write_seconds),
            read_mib_s: throughput_mib_s(bytes, read_seconds),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "bytes": self.bytes,
            "chunked": self.chunked,
            "write_seconds": self.write_seconds,
            "read_seconds": self.read_seconds,
            "write_mib_s": self.write_mib_s,
            "read_mib_s": self.read_mib_s,
        })
    }
}

/// `bytes / MiB / seconds`; zero when no time elapsed.
pub fn throughput_mib_s(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        (bytes as f64 / MIB as f64) / seconds
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    Direct,
    Chunked,
}

impl TransferStrategy {
    pub fn for_payload(payload_bytes: u64, single_file_ceiling: u64) -> Self {
        if payload_bytes > single_file_ceiling {
            TransferStrategy::Chunked
        } else {
            TransferStrategy::Direct
        }
    }
}

/// Copy `src` to `dst` in `chunk_size` blocks, flushing and syncing after
/// every block. Returns the number of bytes copied.
pub fn chunked_copy(
    src: &Path,
    dst: &Path,
    chunk_size: u64,
    progress_interval: u64,
    sink: &dyn MessageSink,
) -> Result<u64> {
    let total = fs::metadata(src).map_err(at(src))?.len();
    let mut reader = File::open(src).map_err(at(src))?;
    let mut writer = File::create(dst).map_err(at(dst))?;
    let mut buf = vec![0u8; chunk_size.max(1) as usize];
    let progress_interval = progress_interval.max(1);
    let mut copied = 0u64;

    loop {
        let n = read_full(&mut reader, &mut buf).map_err(at(src))?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).map_err(|e| {
            SuiteError::io(dst, io::Error::new(e.kind(), format!("at offset {}: {}", copied, e)))
        })?;
        writer.flush().map_err(at(dst))?;
        writer.sync_data().map_err(at(dst))?;
        let before = copied;
        copied += n as u64;
        if copied / progress_interval > before / progress_interval {
            let pct = if total > 0 { copied as f64 * 100.0 / total as f64 } else { 100.0 };
            sink.info(&format!(
                "Copy progress: {:.1}% ({:.2} GiB)",
                pct,
                copied as f64 / GIB as f64
            ));
        }
    }
    writer.sync_all().map_err(at(dst))?;
    Ok(copied)
}

/// Fill `buf` as far as the reader allows; short only at end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Ask the OS to evict `path` from the page cache. Returns whether the hint
/// was issued.
fn drop_cache_hint(path: &Path) -> io::Result<bool> {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            use std::os::unix::io::AsRawFd;
            let file = File::open(path)?;
            file.sync_all()?;
            let ret = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
            if ret != 0 {
                return Err(io::Error::from_raw_os_error(ret));
            }
            Ok(true)
        } else {
            let _ = path;
            Ok(false)
        }
    }
}

/// Everything the module may leave on disk. Explicit `cleanup` logs what it
/// removes; if that is never reached, `Drop` removes the same set quietly.
struct PerfArtifacts {
    test_dir: PathBuf,
    staging_dir: Option<PathBuf>,
    done: bool,
}

impl PerfArtifacts {
    fn files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.test_dir.join(TARGET_FILE_NAME),
            self.test_dir.join(PROBE_FILE_NAME),
        ];
        if let Some(ref staging) = self.staging_dir {
            files.push(staging.join(SOURCE_FILE_NAME));
        }
        files
    }

    fn dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.test_dir.clone()];
        dirs.extend(self.staging_dir.clone());
        dirs
    }

    fn cleanup(&mut self, sink: &dyn MessageSink) -> bool {
        self.done = true;
        let mut ok = true;
        for file in self.files() {
            if !file.exists() {
                continue;
            }
            match fs::remove_file(&file) {
                Ok(()) => sink.info(&format!("Removed {}", file.display())),
                Err(e) => {
                    sink.warn(&format!("Failed to remove {}: {}", file.display(), e));
                    ok = false;
                }
            }
        }
        for dir in self.dirs() {
            if is_empty_dir(&dir) {
                match fs::remove_dir(&dir) {
                    Ok(()) => sink.info(&format!("Removed directory {}", dir.display())),
                    Err(e) => {
                        sink.warn(&format!("Failed to remove {}: {}", dir.display(), e));
                        ok = false;
                    }
                }
            }
        }
        ok
    }
}

impl Drop for PerfArtifacts {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        for file in self.files() {
            let _ = fs::remove_file(file);
        }
        for dir in self.dirs() {
            if is_empty_dir(&dir) {
                let _ = fs::remove_dir(dir);
            }
        }
    }
}

/// The configured staging directory must exist; the suite's own work
/// directory inside it is created on demand.
fn prepare_staging(staging: &Path, work_dir: &Path) -> Result<()> {
    let unavailable = |source: io::Error| SuiteError::StagingUnavailable {
        path: staging.to_path_buf(),
        source,
    };
    let meta = fs::metadata(staging).map_err(unavailable)?;
    if !meta.is_dir() {
        return Err(unavailable(io::Error::new(io::ErrorKind::InvalidInput, "not a directory")));
    }
    if !work_dir.is_dir() {
        fs::create_dir(work_dir).map_err(unavailable)?;
    }
    Ok(())
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(false)
}

pub struct PerformanceTest {
    config: SuiteConfig,
}

impl PerformanceTest {
    pub fn new(config: SuiteConfig) -> Self {
        PerformanceTest { config }
    }

    fn staging_dir(&self) -> Result<&Path> {
        self.config
            .staging_dir
            .as_deref()
            .ok_or(SuiteError::StagingNotConfigured)
    }

    fn check_capacity(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<()> {
        let needed = self
            .config
            .performance_payload_bytes
            .saturating_add(self.config.space_margin_bytes);
        let available = target.free_bytes_now()?;
        let (free, free_unit) = format_bytes(available);
        let (total, total_unit) = format_bytes(target.total_bytes());
        sink.info(&format!(
            "Target capacity: total {:.2} {}, free {:.2} {}",
            total, total_unit, free, free_unit
        ));
        if available < needed {
            let (need, need_unit) = format_bytes(needed);
            sink.error(&format!(
                "Insufficient space on target: need {:.2} {} (payload + margin), {:.2} {} free",
                need, need_unit, free, free_unit
            ));
            return Err(SuiteError::InsufficientSpace { needed, available });
        }
        Ok(())
    }

    fn write_probe(&self, test_dir: &Path, sink: &dyn MessageSink) -> Result<()> {
        let path = test_dir.join(PROBE_FILE_NAME);
        let data = PROBE_PATTERN.repeat(PROBE_REPEAT);
        sink.info("Running small-file write probe...");
        let probe = || -> io::Result<Vec<u8>> {
            let mut f = File::create(&path)?;
            f.write_all(&data)?;
            f.flush()?;
            f.sync_all()?;
            drop(f);
            let back = fs::read(&path)?;
            fs::remove_file(&path)?;
            Ok(back)
        };
        let back = probe().map_err(|e| SuiteError::WriteProbeFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if back != data {
            return Err(SuiteError::WriteProbeFailed {
                path,
                reason: format!("read back {} bytes that differ from the {} written", back.len(), data.len()),
            });
        }
        if path.exists() {
            return Err(SuiteError::WriteProbeFailed { path, reason: "probe file survived deletion".into() });
        }
        sink.info("Write probe passed");
        Ok(())
    }

    fn generate_source(&self, path: &Path, sink: &dyn MessageSink) -> Result<()> {
        let total = self.config.performance_payload_bytes;
        let chunk = self.config.staging_write_chunk.max(1);
        sink.info(&format!(
            "Payload layout: chunk {} bytes, total {} bytes, {} chunks",
            chunk,
            total,
            total.div_ceil(chunk)
        ));
        let started = Instant::now();
        let mut file = File::create(path).map_err(at(path))?;
        let mut buf = vec![0u8; chunk as usize];
        let mut rng = thread_rng();
        let mut written = 0u64;
        while written < total {
            let n = (total - written).min(chunk) as usize;
            rng.fill_bytes(&mut buf[..n]);
            file.write_all(&buf[..n]).map_err(at(path))?;
            let before = written;
            written += n as u64;
            if written / STAGING_PROGRESS_BYTES > before / STAGING_PROGRESS_BYTES {
                sink.info(&format!(
                    "Staging progress: {:.2} GiB / {:.2} GiB",
                    written as f64 / GIB as f64,
                    total as f64 / GIB as f64
                ));
            }
        }
        file.sync_all().map_err(at(path))?;
        sink.info(&format!(
            "Staging payload ready ({} bytes) in {:.2} s",
            written,
            started.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    /// Copy the payload to the target and sync it. Returns elapsed seconds.
    fn transfer(&self, src: &Path, dst: &Path, strategy: TransferStrategy, sink: &dyn MessageSink) -> Result<f64> {
        let started = Instant::now();
        let copied = match strategy {
            TransferStrategy::Chunked => {
                sink.info(&format!(
                    "Payload exceeds the {} byte single-file ceiling; using chunked copy",
                    self.config.single_file_ceiling
                ));
                chunked_copy(
                    src,
                    dst,
                    self.config.copy_chunk_size,
                    self.config.progress_interval_bytes,
                    sink,
                )?
            }
            TransferStrategy::Direct => {
                sink.info("Using direct whole-file copy");
                fs::copy(src, dst).map_err(at(dst))?
            }
        };
        OpenOptions::new()
            .write(true)
            .open(dst)
            .and_then(|f| f.sync_all())
            .map_err(at(dst))?;
        let elapsed = started.elapsed().as_secs_f64();

        let on_device = fs::metadata(dst).map_err(at(dst))?.len();
        let expected = self.config.performance_payload_bytes;
        if copied != expected || on_device != expected {
            return Err(SuiteError::LengthMismatch {
                path: dst.to_path_buf(),
                expected,
                actual: on_device,
            });
        }
        sink.info(&format!("Transfer complete, {} bytes on device", on_device));
        Ok(elapsed)
    }

    fn bypass_cache(&self, path: &Path, sink: &dyn MessageSink) {
        thread::sleep(self.config.settle_pause);
        match drop_cache_hint(path) {
            Ok(true) => sink.debug("Issued page-cache eviction hint for the target file"),
            Ok(false) => sink.debug("No page-cache eviction hint on this platform; read figures may include cache hits"),
            Err(e) => sink.warn(&format!("Cache eviction hint failed: {}", e)),
        }
    }

    /// Sequentially read `path` back. Returns elapsed seconds.
    fn read_back(&self, path: &Path, sink: &dyn MessageSink) -> Result<f64> {
        let expected = self.config.performance_payload_bytes;
        let interval = self.config.progress_interval_bytes.max(1);
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1) as usize];
        let started = Instant::now();
        let mut file = File::open(path).map_err(at(path))?;
        let mut read = 0u64;
        loop {
            let n = file.read(&mut buf).map_err(|e| {
                SuiteError::io(path, io::Error::new(e.kind(), format!("at offset {}: {}", read, e)))
            })?;
            if n == 0 {
                break;
            }
            let before = read;
            read += n as u64;
            if read / interval > before / interval {
                sink.info(&format!(
                    "Read progress: {:.2} GiB / {:.2} GiB",
                    read as f64 / GIB as f64,
                    expected as f64 / GIB as f64
                ));
            }
        }
        let elapsed = started.elapsed().as_secs_f64();
        if read != expected {
            return Err(SuiteError::LengthMismatch { path: path.to_path_buf(), expected, actual: read });
        }
        Ok(elapsed)
    }

    fn measure(
        &self,
        target: &DeviceTarget,
        staging: &Path,
        work_dir: &Path,
        test_dir: &Path,
        sink: &dyn MessageSink,
    ) -> Result<PerformanceReport> {
        self.check_capacity(target, sink)?;

        ensure_test_root(&self.config, target)?;
        self.write_probe(test_dir, sink)?;

        prepare_staging(staging, work_dir)?;
        sink.info(&format!("Staging directory: {}", work_dir.display()));
        let source = work_dir.join(SOURCE_FILE_NAME);
        self.generate_source(&source, sink)?;

        let dst = test_dir.join(TARGET_FILE_NAME);
        let strategy = TransferStrategy::for_payload(
            self.config.performance_payload_bytes,
            self.config.single_file_ceiling,
        );
        sink.info(&format!("Writing payload to {}", dst.display()));
        let write_seconds = match self.transfer(&source, &dst, strategy, sink) {
            Ok(secs) => secs,
            Err(e) => {
                if let Ok(free) = target.free_bytes_now() {
                    sink.error(&format!("Transfer failed with {} bytes free on target", free));
                }
                return Err(e);
            }
        };

        self.bypass_cache(&dst, sink);
        let read_seconds = self.read_back(&dst, sink)?;

        Ok(PerformanceReport::new(
            self.config.performance_payload_bytes,
            strategy == TransferStrategy::Chunked,
            write_seconds,
            read_seconds,
        ))
    }
}

impl TestModule for PerformanceTest {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn execute(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<TestOutcome> {
        let (size, unit) = format_bytes(self.config.performance_payload_bytes);
        sink.info(&format!("Starting performance test ({:.2} {} payload)...", size, unit));
        let staging = self.staging_dir()?.to_path_buf();
        let work_dir = staging.join(&self.config.test_dir_name);
        let test_dir = self.config.test_root(target);

        let mut artifacts = PerfArtifacts {
            test_dir: test_dir.clone(),
            staging_dir: Some(work_dir.clone()),
            done: false,
        };
        let measured = self.measure(target, &staging, &work_dir, &test_dir, sink);
        let cleaned = artifacts.cleanup(sink);
        if !cleaned {
            sink.warn("Some performance artifacts could not be removed");
        }

        let report = match measured {
            Ok(report) => report,
            Err(e) => {
                sink.error(&format!("Performance test failed: {}", e));
                return Ok(TestOutcome::fail(e.to_string()));
            }
        };
        sink.info("=== Performance results ===");
        sink.info(&format!(
            "Write: {:.2} MB/s ({:.2} s)",
            report.write_mib_s, report.write_seconds
        ));
        sink.info(&format!(
            "Read:  {:.2} MB/s ({:.2} s)",
            report.read_mib_s, report.read_seconds
        ));
        Ok(TestOutcome::pass(report.to_json().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KIB;
    use crate::sink::{Level, MemorySink};
    use std::time::Duration;

    const ROOMY: u64 = 1 << 40;

    fn config(staging: &Path, payload: u64) -> SuiteConfig {
        SuiteConfig {
            performance_payload_bytes: payload,
            staging_write_chunk: 256 * KIB,
            copy_chunk_size: MIB,
            read_chunk_size: 64 * KIB,
            single_file_ceiling: MIB,
            space_margin_bytes: 0,
            settle_pause: Duration::ZERO,
            progress_interval_bytes: 2 * MIB,
            ..SuiteConfig::default()
        }
        .with_staging_dir(staging)
    }

    #[test]
    fn throughput_formula() {
        assert_eq!(throughput_mib_s(10 * MIB, 2.0), 5.0);
        assert_eq!(throughput_mib_s(MIB, 0.0), 0.0);
        let report = PerformanceReport::new(4 * MIB, false, 1.0, 0.5);
        assert_eq!(report.write_mib_s, 4.0);
        assert_eq!(report.read_mib_s, 8.0);
        assert_eq!(report.to_json()["bytes"], 4 * MIB);
    }

    #[test]
    fn strategy_switches_above_ceiling() {
        let ceiling = 4 * GIB;
        assert_eq!(TransferStrategy::for_payload(2 * GIB, ceiling), TransferStrategy::Direct);
        assert_eq!(TransferStrategy::for_payload(ceiling, ceiling), TransferStrategy::Direct);
        assert_eq!(TransferStrategy::for_payload(5 * GIB, ceiling), TransferStrategy::Chunked);
    }

    #[test]
    fn no_free_space_fails_before_any_write() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cfg = SuiteConfig {
            performance_payload_bytes: 2 * GIB,
            ..config(scratch.path(), 0)
        };
        let target = DeviceTarget::new(device.path(), 8 * GIB, 0);
        let sink = MemorySink::new();

        assert!(!PerformanceTest::new(cfg).run(&target, &sink));
        assert!(sink.contains("Insufficient space"));
        assert!(!device.path().join("USBTestData").exists());
        assert!(!scratch.path().join("USBTestData").exists());
    }

    #[test]
    fn missing_staging_configuration_is_an_error() {
        let device = tempfile::tempdir().unwrap();
        let cfg = SuiteConfig { staging_dir: None, ..SuiteConfig::default() };
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        let sink = MemorySink::new();
        let outcome = PerformanceTest::new(cfg).outcome(&target, &sink);
        assert!(!outcome.passed);
        assert_eq!(outcome.detail, SuiteError::StagingNotConfigured.to_string());
    }

    #[test]
    fn missing_staging_directory_is_reported() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(scratch.path(), 64 * KIB)
            .with_staging_dir(scratch.path().join("no").join("such").join("dir"));
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        let sink = MemorySink::new();
        let outcome = PerformanceTest::new(cfg).outcome(&target, &sink);
        assert!(!outcome.passed);
        assert!(outcome.detail.starts_with("staging directory"));
        assert!(!device.path().join("USBTestData").exists());
    }

    #[test]
    fn foreign_files_in_staging_area_are_left_alone() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        fs::write(scratch.path().join("thesis.docx"), b"keep me").unwrap();
        fs::write(scratch.path().join(SOURCE_FILE_NAME), b"not ours either").unwrap();
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        let sink = MemorySink::new();

        assert!(PerformanceTest::new(config(scratch.path(), 256 * KIB)).run(&target, &sink));
        assert_eq!(fs::read(scratch.path().join("thesis.docx")).unwrap(), b"keep me");
        assert!(scratch.path().join(SOURCE_FILE_NAME).exists());
        assert!(!scratch.path().join("USBTestData").exists());
    }

    #[test]
    fn staging_path_that_is_a_file_is_unavailable() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let not_a_dir = scratch.path().join("scratch.img");
        fs::write(&not_a_dir, b"x").unwrap();
        let cfg = config(scratch.path(), 64 * KIB).with_staging_dir(&not_a_dir);
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        let outcome = PerformanceTest::new(cfg).outcome(&target, &MemorySink::new());
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("not a directory"));
        assert_eq!(fs::read(&not_a_dir).unwrap(), b"x");
    }

    #[test]
    fn payload_above_ceiling_is_chunk_copied_to_exact_length() {
        let scratch = tempfile::tempdir().unwrap();
        let src = scratch.path().join("src.dat");
        let dst = scratch.path().join("dst.dat");
        let payload = 5 * MIB + 123;
        fs::write(&src, crate::payload::random_bytes(payload as usize)).unwrap();

        let sink = MemorySink::new();
        let copied = chunked_copy(&src, &dst, MIB, 2 * MIB, &sink).unwrap();
        assert_eq!(copied, payload);
        assert_eq!(fs::metadata(&dst).unwrap().len(), payload);
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dst).unwrap());
        assert_eq!(sink.count_containing("Copy progress"), 2);
    }

    #[test]
    fn full_run_chunked_reports_and_cleans_up() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(scratch.path(), 5 * MIB);
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        let sink = MemorySink::new();

        let outcome = PerformanceTest::new(cfg).outcome(&target, &sink);
        assert!(outcome.passed, "{}", outcome.detail);
        let report: serde_json::Value = serde_json::from_str(&outcome.detail).unwrap();
        assert_eq!(report["bytes"], 5 * MIB);
        assert_eq!(report["chunked"], true);
        assert!(sink.contains("using chunked copy"));
        assert!(sink.contains("Write probe passed"));
        assert!(!device.path().join("USBTestData").exists());
        assert!(!scratch.path().join("USBTestData").exists());
        assert_eq!(sink.count_at(Level::Error), 0);
    }

    #[test]
    fn full_run_below_ceiling_copies_directly() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(scratch.path(), 512 * KIB);
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        let sink = MemorySink::new();

        assert!(PerformanceTest::new(cfg).run(&target, &sink));
        assert!(sink.contains("direct whole-file copy"));
        assert!(!sink.contains("chunked copy"));
    }

    #[test]
    fn failed_transfer_still_removes_staging_payload() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let cfg = config(scratch.path(), 64 * KIB);
        let target = DeviceTarget::new(device.path(), ROOMY, ROOMY);
        // A directory where the target payload file should go.
        fs::create_dir_all(device.path().join("USBTestData").join(TARGET_FILE_NAME)).unwrap();
        let sink = MemorySink::new();

        assert!(!PerformanceTest::new(cfg).run(&target, &sink));
        assert!(sink.contains("Performance test failed"));
        assert!(!scratch.path().join("USBTestData").exists());
    }

    #[test]
    fn drop_guard_removes_artifacts_when_cleanup_is_skipped() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let test_dir = device.path().join("USBTestData");
        let staging = scratch.path().join("staging");
        fs::create_dir_all(&test_dir).unwrap();
        fs::create_dir_all(&staging).unwrap();
        fs::write(test_dir.join(TARGET_FILE_NAME), b"x").unwrap();
        fs::write(staging.join(SOURCE_FILE_NAME), b"x").unwrap();

        drop(PerfArtifacts { test_dir: test_dir.clone(), staging_dir: Some(staging.clone()), done: false });
        assert!(!test_dir.exists());
        assert!(!staging.exists());
    }
}
