use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use crate::cleaner::Cleaner;
use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::error::SuiteError;
use crate::modules::{TestKind, TestModule, TestOutcome};
use crate::sink::MessageSink;

#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub name: String,
    pub outcome: TestOutcome,
}

/// What a run produced. Test results and cleanup are kept apart: a clean
/// pass can still leave a cleanup warning.
#[derive(Debug, Clone)]
pub struct SuiteOutcome {
    pub all_passed: bool,
    pub cleanup_ok: bool,
    pub reports: Vec<ModuleReport>,
}

impl SuiteOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        let modules: Vec<serde_json::Value> = self
            .reports
            .iter()
            .map(|r| {
                json!({
                    "name": r.name,
                    "passed": r.outcome.passed,
                    "detail": r.outcome.detail,
                })
            })
            .collect();
        json!({
            "all_passed": self.all_passed,
            "cleanup_ok": self.cleanup_ok,
            "modules": modules,
        })
    }
}

/// Runs selected modules one after another, then always cleans up.
pub struct Orchestrator {
    config: SuiteConfig,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Orchestrator {
    pub fn new(config: SuiteConfig) -> Self {
        Orchestrator { config, interrupt: None }
    }

    /// Once `flag` is raised, modules not yet started are skipped.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Resolve `names` through the registry and run them in order.
    pub fn run_selected(
        &self,
        target: &DeviceTarget,
        sink: &dyn MessageSink,
        names: &[&str],
    ) -> SuiteOutcome {
        let modules: Vec<(String, Result<Box<dyn TestModule>, SuiteError>)> = names
            .iter()
            .map(|name| {
                let module = name.parse::<TestKind>().map(|kind| kind.build(&self.config));
                (name.to_string(), module)
            })
            .collect();
        self.run_resolved(target, sink, modules)
    }

    /// Run already-built modules in order.
    pub fn run_modules(
        &self,
        target: &DeviceTarget,
        sink: &dyn MessageSink,
        modules: Vec<Box<dyn TestModule>>,
    ) -> SuiteOutcome {
        let modules = modules
            .into_iter()
            .map(|m| (m.name().to_string(), Ok(m)))
            .collect();
        self.run_resolved(target, sink, modules)
    }

    fn run_resolved(
        &self,
        target: &DeviceTarget,
        sink: &dyn MessageSink,
        modules: Vec<(String, Result<Box<dyn TestModule>, SuiteError>)>,
    ) -> SuiteOutcome {
        let names: Vec<&str> = modules.iter().map(|(n, _)| n.as_str()).collect();
        sink.info(&format!("Selected tests: {}", names.join(", ")));

        let mut reports = Vec::with_capacity(modules.len());
        for (name, module) in modules {
            let outcome = if self.interrupted() {
                sink.warn(&format!("Skipping {}: run interrupted", name));
                TestOutcome::fail("skipped: interrupted")
            } else {
                match module {
                    Ok(module) => run_guarded(module.as_ref(), &name, target, sink),
                    Err(e) => {
                        sink.error(&format!("{}", e));
                        TestOutcome::fail(e.to_string())
                    }
                }
            };
            reports.push(ModuleReport { name, outcome });
        }

        let all_passed = reports.iter().all(|r| r.outcome.passed);
        let cleanup_ok = Cleaner::for_target(&self.config, target).complete_cleanup(sink);
        if !cleanup_ok {
            sink.warn("Cleanup reported leftovers; test results are unaffected");
        }

        let passed = reports.iter().filter(|r| r.outcome.passed).count();
        sink.info(&format!(
            "Summary: {}/{} passed, cleanup {}",
            passed,
            reports.len(),
            if cleanup_ok { "ok" } else { "incomplete" }
        ));
        SuiteOutcome { all_passed, cleanup_ok, reports }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// One module, with panics turned into a failed outcome.
fn run_guarded(
    module: &dyn TestModule,
    name: &str,
    target: &DeviceTarget,
    sink: &dyn MessageSink,
) -> TestOutcome {
    sink.info(&format!("--- Starting: {} ---", name));
    let result = panic::catch_unwind(AssertUnwindSafe(|| module.outcome(target, sink)));
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "(panic payload not a string)".to_string()
            };
            sink.error(&format!("{} raised an internal error: {}", name, msg));
            TestOutcome::fail(format!("internal error: {}", msg))
        }
    };
    if outcome.passed {
        sink.info(&format!("{} PASSED", name));
    } else {
        sink.error(&format!("{} FAILED: {}", name, outcome.detail));
    }
    outcome
}
