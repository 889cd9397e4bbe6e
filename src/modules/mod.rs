//! The five validation workloads and the registry that names them.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::error::{Result, SuiteError};
use crate::sink::MessageSink;

pub mod compatibility;
pub mod integrity;
pub mod performance;
pub mod stability;
pub mod stress;

pub use compatibility::CompatibilityTest;
pub use integrity::IntegrityTest;
pub use performance::{PerformanceReport, PerformanceTest};
pub use stability::StabilityTest;
pub use stress::StressTest;

/// Result of one module invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub passed: bool,
    pub detail: String,
}

impl TestOutcome {
    pub fn pass(detail: impl Into<String>) -> Self {
        TestOutcome { passed: true, detail: detail.into() }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        TestOutcome { passed: false, detail: detail.into() }
    }
}

/// A unit of validation run against a device.
///
/// Implementors provide [`execute`](TestModule::execute); callers use
/// [`run`](TestModule::run) or [`outcome`](TestModule::outcome), which never
/// return an error: failures are logged through the sink and become a
/// failed outcome.
pub trait TestModule: Send {
    fn name(&self) -> &'static str;

    fn execute(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<TestOutcome>;

    fn outcome(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> TestOutcome {
        match self.execute(target, sink) {
            Ok(outcome) => outcome,
            Err(e) => {
                sink.error(&format!("{} aborted: {}", self.name(), e));
                TestOutcome::fail(e.to_string())
            }
        }
    }

    fn run(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> bool {
        self.outcome(target, sink).passed
    }
}

/// Static registry of the available modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    Compatibility,
    Integrity,
    Performance,
    Stress,
    Stability,
}

impl TestKind {
    pub const ALL: [TestKind; 5] = [
        TestKind::Compatibility,
        TestKind::Integrity,
        TestKind::Performance,
        TestKind::Stress,
        TestKind::Stability,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TestKind::Compatibility => "compatibility",
            TestKind::Integrity => "integrity",
            TestKind::Performance => "performance",
            TestKind::Stress => "stress",
            TestKind::Stability => "stability",
        }
    }

    pub fn build(self, config: &SuiteConfig) -> Box<dyn TestModule> {
        let config = config.clone();
        match self {
            TestKind::Compatibility => Box::new(CompatibilityTest::new(config)),
            TestKind::Integrity => Box::new(IntegrityTest::new(config)),
            TestKind::Performance => Box::new(PerformanceTest::new(config)),
            TestKind::Stress => Box::new(StressTest::new(config)),
            TestKind::Stability => Box::new(StabilityTest::new(config)),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestKind {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        TestKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| SuiteError::UnknownTest(s.to_string()))
    }
}

/// Create the shared test root on first use.
pub(crate) fn ensure_test_root(config: &SuiteConfig, target: &DeviceTarget) -> Result<PathBuf> {
    let root = config.test_root(target);
    fs::create_dir_all(&root).map_err(|e| SuiteError::io(&root, e))?;
    Ok(root)
}

/// Remove a module's own files (those `owned` accepts) plus any `*.tmp`
/// leftovers, then the directory itself if nothing else is in it.
/// Failures only warn.
pub(crate) fn sweep_own_artifacts(
    dir: &Path,
    owned: impl Fn(&str) -> bool,
    sink: &dyn MessageSink,
) {
    if !dir.exists() {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            sink.warn(&format!("Could not list {} for cleanup: {}", dir.display(), e));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_owned = owned(&name);
        if !is_owned && !name.ends_with(".tmp") {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) if is_owned => sink.info(&format!("Removed test file: {}", name)),
            Ok(()) => {}
            Err(e) => sink.warn(&format!("Failed to remove {}: {}", name, e)),
        }
    }
    let empty = fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(false);
    if empty {
        match fs::remove_dir(dir) {
            Ok(()) => sink.info(&format!("Removed test directory: {}", dir.display())),
            Err(e) => sink.warn(&format!("Failed to remove {}: {}", dir.display(), e)),
        }
    }
}
