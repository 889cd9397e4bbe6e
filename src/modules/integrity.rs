use std::path::Path;

use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::error::Result;
use crate::modules::{ensure_test_root, sweep_own_artifacts, TestModule, TestOutcome};
use crate::payload::FileRecord;
use crate::sink::MessageSink;

const FILE_PREFIX: &str = "integrity_test_";
const FILE_SUFFIX: &str = ".txt";

/// Many small files; every failure is reported, not only the first.
pub struct IntegrityTest {
    config: SuiteConfig,
}

impl IntegrityTest {
    pub fn new(config: SuiteConfig) -> Self {
        IntegrityTest { config }
    }

    pub(crate) fn write_files(&self, dir: &Path) -> Result<Vec<FileRecord>> {
        (0..self.config.integrity_file_count)
            .map(|i| {
                let path = dir.join(format!("{}{:03}{}", FILE_PREFIX, i, FILE_SUFFIX));
                FileRecord::write_hashed(path, self.config.integrity_file_size)
            })
            .collect()
    }
}

fn is_integrity_file(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
}

/// Verify every record and return the names that failed.
pub(crate) fn collect_failures(records: &[FileRecord], sink: &dyn MessageSink) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| match record.verify() {
            Ok(()) => None,
            Err(e) => {
                sink.error(&format!("File {} failed verification: {}", record.file_name(), e));
                Some(record.file_name())
            }
        })
        .collect()
}

impl TestModule for IntegrityTest {
    fn name(&self) -> &'static str {
        "integrity"
    }

    fn execute(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<TestOutcome> {
        sink.info("Starting data integrity test...");
        let dir = ensure_test_root(&self.config, target)?;
        let written = self.write_files(&dir);
        let outcome = written.map(|records| {
            let failures = collect_failures(&records, sink);
            if failures.is_empty() {
                sink.info("Data integrity test passed");
                TestOutcome::pass(format!("{} files verified", records.len()))
            } else {
                sink.error(&format!(
                    "Data integrity test failed: {} of {} files bad",
                    failures.len(),
                    records.len()
                ));
                TestOutcome::fail(format!("failed files: {}", failures.join(", ")))
            }
        });
        sweep_own_artifacts(&dir, is_integrity_file, sink);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Level, MemorySink};
    use std::fs;

    fn config(count: usize) -> SuiteConfig {
        SuiteConfig { integrity_file_count: count, ..SuiteConfig::default() }
    }

    #[test]
    fn passes_and_cleans_up_after_itself() {
        let dir = tempfile::tempdir().unwrap();
        let target = DeviceTarget::new(dir.path(), 0, 0);
        let sink = MemorySink::new();
        assert!(IntegrityTest::new(config(50)).run(&target, &sink));
        assert!(!dir.path().join("USBTestData").exists());
        assert_eq!(sink.count_containing("Removed test file: integrity_test_"), 50);
    }

    #[test]
    fn failed_run_still_removes_its_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = DeviceTarget::new(dir.path(), 0, 0);
        let root = dir.path().join("USBTestData");
        // A directory squatting on the fourth file's name stops the write phase.
        fs::create_dir_all(root.join("integrity_test_003.txt")).unwrap();

        let sink = MemorySink::new();
        assert!(!IntegrityTest::new(config(10)).run(&target, &sink));
        assert!(sink.contains("integrity aborted"));
        for i in 0..3 {
            assert!(!root.join(format!("integrity_test_{:03}.txt", i)).exists());
        }
        assert_eq!(sink.count_containing("Removed test file: integrity_test_"), 3);
        let remaining: Vec<_> = fs::read_dir(&root).unwrap().flatten().map(|e| e.file_name()).collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("integrity_test_003.txt")]);
    }

    #[test]
    fn every_bad_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let test = IntegrityTest::new(config(10));
        let records = test.write_files(dir.path()).unwrap();
        fs::write(&records[2].path, b"tampered").unwrap();
        fs::remove_file(&records[5].path).unwrap();
        fs::write(&records[9].path, b"").unwrap();

        let sink = MemorySink::new();
        let failures = collect_failures(&records, &sink);
        assert_eq!(
            failures,
            vec!["integrity_test_002.txt", "integrity_test_005.txt", "integrity_test_009.txt"]
        );
        assert_eq!(sink.count_at(Level::Error), 3);
    }

    #[test]
    fn stray_tmp_files_are_swept_but_foreign_files_keep_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = DeviceTarget::new(dir.path(), 0, 0);
        let root = dir.path().join("USBTestData");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("orphan.tmp"), b"x").unwrap();
        fs::write(root.join("large.dat"), b"x").unwrap();

        let sink = MemorySink::new();
        assert!(IntegrityTest::new(config(3)).run(&target, &sink));
        assert!(!root.join("orphan.tmp").exists());
        assert!(root.join("large.dat").exists());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 1);
    }

    #[test]
    fn file_names_are_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let records = IntegrityTest::new(config(2)).write_files(dir.path()).unwrap();
        assert_eq!(records[1].file_name(), "integrity_test_001.txt");
        assert!(is_integrity_file("integrity_test_049.txt"));
        assert!(!is_integrity_file("stability_00001.tmp"));
    }
}
