use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::error::{at, Result};
use crate::modules::{ensure_test_root, sweep_own_artifacts, TestModule, TestOutcome};
use crate::payload::{random_bytes, Expectation, FileRecord};
use crate::sink::MessageSink;

/// Single-threaded write/read/delete churn for a fixed wall-clock window.
/// Any failed iteration ends the test.
pub struct StabilityTest {
    config: SuiteConfig,
}

impl StabilityTest {
    pub fn new(config: SuiteConfig) -> Self {
        StabilityTest { config }
    }

    fn iteration(&self, dir: &Path, n: u64) -> Result<()> {
        let path = dir.join(format!("stability_{:05}.tmp", n));
        let size = self.config.stability_file_size;
        fs::write(&path, random_bytes(size as usize)).map_err(at(&path))?;
        let record = FileRecord { path, expected: Expectation::Length(size) };
        record.verify()?;
        fs::remove_file(&record.path).map_err(at(&record.path))
    }
}

fn is_stability_file(name: &str) -> bool {
    name.starts_with("stability_") && name.ends_with(".tmp")
}

impl TestModule for StabilityTest {
    fn name(&self) -> &'static str {
        "stability"
    }

    fn execute(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<TestOutcome> {
        let duration = self.config.stability_duration;
        sink.info(&format!(
            "Starting stability test ({:.0} s)...",
            duration.as_secs_f64()
        ));
        let dir = ensure_test_root(&self.config, target)?;
        let report_every = self.config.stability_report_every.max(1);
        let start = Instant::now();
        let mut iterations = 0u64;

        while start.elapsed() < duration {
            if let Err(e) = self.iteration(&dir, iterations) {
                sink.error(&format!("Stability test failed at iteration {}: {}", iterations, e));
                return Ok(TestOutcome::fail(format!("iteration {} failed: {}", iterations, e)));
            }
            iterations += 1;
            if iterations % report_every == 0 {
                sink.debug(&format!("{} stability iterations completed", iterations));
            }
        }

        sink.info(&format!("Stability test passed, {} iterations", iterations));
        sweep_own_artifacts(&dir, is_stability_file, sink);
        Ok(TestOutcome::pass(format!("{} iterations", iterations)))
    }
}
