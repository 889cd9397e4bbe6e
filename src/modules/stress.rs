//! Concurrent write/read/delete churn.
//!
//! Each worker owns a disjoint file-name namespace (`stress_<worker>_<seq>.tmp`),
//! so no locking is needed around file operations. The only shared state is
//! the stop flag: stored once by the controlling thread, polled once per
//! iteration by every worker. A worker finishes the iteration it is in before
//! it notices the flag, so a run can overshoot its nominal duration slightly.
//!
//! A worker that hits an I/O error reports it and exits; the others carry on.
//! Those errors are logged but do not fail the module: the test measures
//! whether the device survives concurrent load, not whether it is error-free.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Receiver, Sender};

use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::error::{at, Result, SuiteError};
use crate::modules::{ensure_test_root, sweep_own_artifacts, TestModule, TestOutcome};
use crate::payload::write_random_file;
use crate::sink::MessageSink;

pub struct StressTest {
    config: SuiteConfig,
}

impl StressTest {
    pub fn new(config: SuiteConfig) -> Self {
        StressTest { config }
    }
}

enum WorkerEvent {
    Failed { worker: usize, seq: u64, error: String },
    Finished { worker: usize, iterations: u64 },
}

/// Sends `Finished` however the worker loop ends, unwinding included.
struct FinishNotice {
    worker: usize,
    iterations: u64,
    tx: Sender<WorkerEvent>,
}

impl Drop for FinishNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerEvent::Finished {
            worker: self.worker,
            iterations: self.iterations,
        });
    }
}

fn worker_file(dir: &Path, worker: usize, seq: u64) -> PathBuf {
    dir.join(format!("stress_{}_{:04}.tmp", worker, seq))
}

fn churn_once(path: &Path, size: u64) -> Result<()> {
    write_random_file(path, size)?;
    let mut buf = Vec::with_capacity(size as usize);
    fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(at(path))?;
    fs::remove_file(path).map_err(at(path))
}

fn worker_loop(worker: usize, dir: PathBuf, size: u64, stop: Arc<AtomicBool>, tx: Sender<WorkerEvent>) {
    let mut notice = FinishNotice { worker, iterations: 0, tx: tx.clone() };
    while !stop.load(Ordering::Acquire) {
        let seq = notice.iterations;
        let path = worker_file(&dir, worker, seq);
        if let Err(e) = churn_once(&path, size) {
            let _ = fs::remove_file(&path);
            let _ = tx.send(WorkerEvent::Failed { worker, seq, error: e.to_string() });
            break;
        }
        notice.iterations += 1;
    }
}

struct Tally {
    finished: Vec<Option<u64>>,
    errors: usize,
}

impl Tally {
    fn record(&mut self, event: WorkerEvent, sink: &dyn MessageSink) {
        match event {
            WorkerEvent::Failed { worker, seq, error } => {
                self.errors += 1;
                sink.error(&format!(
                    "Stress worker {} stopped at iteration {}: {}",
                    worker, seq, error
                ));
            }
            WorkerEvent::Finished { worker, iterations } => {
                sink.info(&format!(
                    "Stress worker {} finished after {} iterations",
                    worker, iterations
                ));
                if let Some(slot) = self.finished.get_mut(worker) {
                    *slot = Some(iterations);
                }
            }
        }
    }

    fn all_finished(&self) -> bool {
        self.finished.iter().all(Option::is_some)
    }

    /// Forward events until `deadline` passes or every worker is gone.
    fn drain_until(&mut self, rx: &Receiver<WorkerEvent>, deadline: Instant, sink: &dyn MessageSink) {
        while !self.all_finished() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO {
                return;
            }
            match rx.recv_timeout(remaining) {
                Ok(event) => self.record(event, sink),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

fn join_worker(worker: usize, handle: JoinHandle<()>, sink: &dyn MessageSink) {
    if handle.join().is_err() {
        sink.error(&format!("Stress worker {} panicked", worker));
    }
}

/// Join every already-spawned worker after an aborted start.
fn join_workers(handles: Vec<JoinHandle<()>>, sink: &dyn MessageSink) {
    for (worker, handle) in handles.into_iter().enumerate() {
        join_worker(worker, handle, sink);
    }
}

impl TestModule for StressTest {
    fn name(&self) -> &'static str {
        "stress"
    }

    fn execute(&self, target: &DeviceTarget, sink: &dyn MessageSink) -> Result<TestOutcome> {
        let workers = self.config.stress_workers;
        let duration = self.config.stress_duration;
        sink.info(&format!(
            "Starting stress test ({} workers, {:.0} s)...",
            workers,
            duration.as_secs_f64()
        ));
        let dir = ensure_test_root(&self.config, target)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        for worker in 0..workers {
            let dir = dir.clone();
            let worker_stop = Arc::clone(&stop);
            let tx = tx.clone();
            let size = self.config.stress_file_size;
            let spawned = thread::Builder::new()
                .name(format!("stress-{}", worker))
                .spawn(move || worker_loop(worker, dir, size, worker_stop, tx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    sink.error(&format!("Could not spawn stress worker {}: {}", worker, e));
                    stop.store(true, Ordering::Release);
                    join_workers(handles, sink);
                    return Err(SuiteError::Io(e));
                }
            }
        }
        drop(tx);

        let mut tally = Tally { finished: vec![None; workers], errors: 0 };
        tally.drain_until(&rx, Instant::now() + duration, sink);

        stop.store(true, Ordering::Release);
        tally.drain_until(&rx, Instant::now() + self.config.stress_join_timeout, sink);

        let mut detached = 0;
        for (worker, handle) in handles.into_iter().enumerate() {
            if tally.finished[worker].is_none() {
                detached += 1;
                sink.warn(&format!(
                    "Stress worker {} did not stop within {:?}; leaving it detached",
                    worker, self.config.stress_join_timeout
                ));
                continue;
            }
            join_worker(worker, handle, sink);
        }

        let iterations: u64 = tally.finished.iter().flatten().sum();
        if detached == 0 {
            sweep_own_artifacts(&dir, |n| n.starts_with("stress_") && n.ends_with(".tmp"), sink);
        }
        sink.info(&format!(
            "Stress test completed: {} iterations, {} worker errors",
            iterations, tally.errors
        ));
        Ok(TestOutcome::pass(format!(
            "{} workers, {} iterations, {} worker errors, {} detached",
            workers, iterations, tally.errors, detached
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Level, MemorySink};
    use walkdir::WalkDir;

    fn config(ms: u64) -> SuiteConfig {
        SuiteConfig {
            stress_duration: Duration::from_millis(ms),
            stress_join_timeout: Duration::from_millis(500),
            ..SuiteConfig::default()
        }
    }

    fn files_under(root: &Path) -> usize {
        WalkDir::new(root)
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .count()
    }

    #[test]
    fn all_workers_join_and_nothing_is_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = DeviceTarget::new(dir.path(), 0, 0);
        let sink = MemorySink::new();
        let outcome = StressTest::new(config(300)).outcome(&target, &sink);
        assert!(outcome.passed);
        assert!(outcome.detail.ends_with("0 detached"));
        assert_eq!(sink.count_containing("finished after"), 3);
        assert_eq!(files_under(dir.path()), 0);
    }

    #[test]
    fn one_failing_worker_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let target = DeviceTarget::new(dir.path(), 0, 0);
        let root = dir.path().join("USBTestData");
        // Worker 1 cannot create its first file.
        fs::create_dir_all(root.join("stress_1_0000.tmp")).unwrap();

        let sink = MemorySink::new();
        let outcome = StressTest::new(config(300)).outcome(&target, &sink);
        assert!(outcome.passed);
        assert!(outcome.detail.contains("1 worker errors"));
        assert_eq!(sink.count_at(Level::Error), 1);
        assert!(sink.contains("Stress worker 1 stopped at iteration 0"));
        assert!(sink.contains("Stress worker 1 finished after 0 iterations"));
        assert!(!sink.contains("Stress worker 0 finished after 0 iterations"));
        assert!(!sink.contains("Stress worker 2 finished after 0 iterations"));
        assert_eq!(files_under(&root), 0);
    }

    #[test]
    fn aborted_start_still_reports_panicked_workers() {
        let healthy = thread::spawn(|| {});
        let broken = thread::Builder::new()
            .name("stress-1".into())
            .spawn(|| panic!("worker blew up"))
            .unwrap();
        let sink = MemorySink::new();
        join_workers(vec![healthy, broken], &sink);
        assert!(sink.contains("Stress worker 1 panicked"));
        assert!(!sink.contains("Stress worker 0 panicked"));
    }

    #[test]
    fn raised_stop_flag_ends_a_worker_before_its_first_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let stop = Arc::new(AtomicBool::new(true));
        let (tx, rx) = crossbeam_channel::unbounded();
        worker_loop(0, dir.path().to_path_buf(), 16, Arc::clone(&stop), tx);
        match rx.recv().unwrap() {
            WorkerEvent::Finished { worker, iterations } => assert_eq!((worker, iterations), (0, 0)),
            WorkerEvent::Failed { .. } => panic!("worker should not have failed"),
        }
        assert_eq!(files_under(dir.path()), 0);
    }

    #[test]
    fn worker_namespaces_are_disjoint() {
        let dir = Path::new("/mnt/usb/USBTestData");
        assert_ne!(worker_file(dir, 0, 12), worker_file(dir, 1, 12));
        assert_ne!(worker_file(dir, 1, 2), worker_file(dir, 12, 0));
        assert_eq!(worker_file(dir, 2, 7).file_name().unwrap(), "stress_2_0007.tmp");
    }
}
