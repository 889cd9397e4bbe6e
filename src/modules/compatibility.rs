use std::path::Path;

use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::error::Result;
use crate::modules::{ensure_test_root, TestModule, TestOutcome};
use crate::payload::FileRecord;
use crate::sink::MessageSink;

/// Round-trips one file per size tier and stops at the first bad one.
pub struct CompatibilityTest {
    config: SuiteConfig,
}

impl CompatibilityTest {
    pub fn new(config: SuiteConfig) -> Self {
        CompatibilityTest { config }
    }

    fn tiers(&self) -> [(&'static str, u64); 3] {
        [
            ("small.txt", self.config.small_file_size),
            ("medium.bin", self.config.medium_file_size),
            ("large.dat", self.config.large_file_size),
        ]
    }

    pub(crate) fn write_tiers(&self, dir: &Path, sink: &dyn MessageSink) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(3);
        for (name, size) in self.tiers() {
            records.push(FileRecord::write_hashed(dir.join(name), size)?);
            sink.info(&format!("Created test file: {} ({} bytes)", name, size));
        }
        Ok(records)
    }
}

/// Index of the first record that fails verification, if any.
pub(crate) fn first_failure(records: &[FileRecord], sink: &dyn MessageSink) -> Option<usize> {
    for (idx, record) in records.iter().enumerate() {
        match record.verify() {
            Ok(()) => sink.info(&format!("File {} verified", record.file_name())),
            Err(e) => {
                sink.error(&format!("File {} failed verification: {}", record.file_name(), e));
                return Some(idx);
            }
        }
    }
    None
}

impl TestModule for CompatibilityTest {
    fn name(&self) -> &'static str {
        "compatibility"
    }

    fn execute(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<TestOutcome> {
        sink.info("Starting data compatibility test...");
        let dir = ensure_test_root(&self.config, target)?;
        let records = self.write_tiers(&dir, sink)?;
        if let Some(idx) = first_failure(&records, sink) {
            return Ok(TestOutcome::fail(format!(
                "{} failed verification",
                records[idx].file_name()
            )));
        }
        sink.info("Data compatibility test passed");
        Ok(TestOutcome::pass(format!("{} files verified", records.len())))
    }
}
