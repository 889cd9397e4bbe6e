//! Leaves the device (and the staging area) free of test artifacts.
//!
//! Escalation order: a per-entry deep cleanup of the test root, deepest
//! paths first; then, if anything is left, a recursive removal of the whole
//! root; then an independent purge of the suite's staging work directory. Nothing here
//! returns an error: problems are logged and folded into the boolean result.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::SuiteConfig;
use crate::device_target::DeviceTarget;
use crate::sink::MessageSink;

pub struct Cleaner {
    test_root: PathBuf,
    staging_dir: Option<PathBuf>,
}

impl Cleaner {
    pub fn new(test_root: impl Into<PathBuf>, staging_dir: Option<PathBuf>) -> Self {
        Cleaner {
            test_root: test_root.into(),
            staging_dir,
        }
    }

    pub fn for_target(config: &SuiteConfig, target: &DeviceTarget) -> Self {
        Cleaner::new(config.test_root(target), config.staging_work_dir())
    }

    pub fn test_root(&self) -> &Path {
        &self.test_root
    }

    /// Run every stage. `true` when the test root is gone and the staging
    /// purge succeeded.
    pub fn complete_cleanup(&self, sink: &dyn MessageSink) -> bool {
        sink.info("Starting full cleanup...");
        let root_ok = if self.cleanup_test_root(sink) {
            true
        } else {
            sink.warn("Deep cleanup left residue, escalating to recursive removal");
            self.force_remove_root(sink)
        };
        let staging_ok = self.cleanup_staging(sink);
        let ok = root_ok && staging_ok;
        if ok {
            sink.info("Cleanup complete");
        } else {
            sink.error("Cleanup incomplete; check the device for leftover test files");
        }
        ok
    }

    /// Deep cleanup of the test root, then removal of the root itself.
    /// A missing root is success.
    pub fn cleanup_test_root(&self, sink: &dyn MessageSink) -> bool {
        if !self.test_root.exists() {
            sink.info("Test directory does not exist, nothing to clean");
            return true;
        }
        sink.info(&format!("Cleaning {}", self.test_root.display()));
        if !self.deep_cleanup(sink) {
            return false;
        }
        match fs::remove_dir(&self.test_root) {
            Ok(()) => {
                sink.info(&format!("Removed test directory {}", self.test_root.display()));
                true
            }
            Err(e) => {
                let leftovers: Vec<String> = fs::read_dir(&self.test_root)
                    .map(|d| {
                        d.flatten()
                            .map(|e| e.file_name().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                sink.warn(&format!(
                    "Could not remove {}: {} (remaining: {:?})",
                    self.test_root.display(),
                    e,
                    leftovers
                ));
                false
            }
        }
    }

    /// Delete everything under the root, deepest first. Continues past
    /// failures; returns whether every entry went away.
    fn deep_cleanup(&self, sink: &dyn MessageSink) -> bool {
        let mut ok = true;
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.test_root).min_depth(1) {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    sink.error(&format!("Failed to enumerate {}: {}", self.test_root.display(), e));
                    ok = false;
                }
            }
        }
        entries.sort_by(|a, b| {
            b.depth()
                .cmp(&a.depth())
                .then_with(|| b.path().as_os_str().len().cmp(&a.path().as_os_str().len()))
        });

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                match fs::remove_dir(path) {
                    Ok(()) => sink.info(&format!("Removed empty directory: {}", name)),
                    Err(e) => {
                        sink.warn(&format!("Could not remove directory {}: {}", name, e));
                        ok = false;
                    }
                }
            } else {
                match fs::remove_file(path) {
                    Ok(()) => sink.info(&format!("Removed file: {}", name)),
                    Err(e) => {
                        sink.error(&format!("Failed to remove {}: {}", name, e));
                        ok = false;
                    }
                }
            }
        }
        ok
    }

    /// Recursive removal of the whole test root.
    pub fn force_remove_root(&self, sink: &dyn MessageSink) -> bool {
        if !self.test_root.exists() {
            return true;
        }
        match fs::remove_dir_all(&self.test_root) {
            Ok(()) => {
                sink.info(&format!("Force-removed {}", self.test_root.display()));
                true
            }
            Err(e) => {
                sink.error(&format!("Force removal of {} failed: {}", self.test_root.display(), e));
                false
            }
        }
    }

    /// Remove the files in the suite's staging work directory, then the
    /// directory itself if empty. The configured staging area around it is
    /// never touched.
    pub fn cleanup_staging(&self, sink: &dyn MessageSink) -> bool {
        let Some(ref staging) = self.staging_dir else {
            return true;
        };
        if !staging.exists() {
            return true;
        }
        sink.info(&format!("Cleaning staging directory {}", staging.display()));
        let entries = match fs::read_dir(staging) {
            Ok(entries) => entries,
            Err(e) => {
                sink.error(&format!("Failed to list {}: {}", staging.display(), e));
                return false;
            }
        };
        let mut ok = true;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => sink.info(&format!("Removed staging file: {}", entry.file_name().to_string_lossy())),
                Err(e) => {
                    sink.error(&format!("Failed to remove {}: {}", path.display(), e));
                    ok = false;
                }
            }
        }
        let empty = fs::read_dir(staging).map(|mut d| d.next().is_none()).unwrap_or(false);
        if empty {
            match fs::remove_dir(staging) {
                Ok(()) => sink.info("Removed staging directory"),
                Err(e) => {
                    sink.error(&format!("Failed to remove {}: {}", staging.display(), e));
                    ok = false;
                }
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("a").join("b").join("c")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("top.tmp"), b"1").unwrap();
        fs::write(root.join("a").join("mid.bin"), b"2").unwrap();
        fs::write(root.join("a").join("b").join("c").join("deep.dat"), b"3").unwrap();
    }

    #[test]
    fn deep_cleanup_removes_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("USBTestData");
        populate(&root);
        let sink = MemorySink::new();
        let cleaner = Cleaner::new(&root, None);

        assert!(cleaner.complete_cleanup(&sink));
        assert!(!root.exists());
        assert!(sink.contains("Removed file: deep.dat"));
        assert!(sink.contains("Removed empty directory: c"));
        assert!(!sink.contains("escalating"));
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("USBTestData");
        populate(&root);
        let cleaner = Cleaner::new(&root, None);
        let sink = MemorySink::new();
        assert!(cleaner.complete_cleanup(&sink));
        assert!(cleaner.complete_cleanup(&sink));
        assert!(sink.contains("nothing to clean"));
        assert!(!root.exists());
    }

    #[test]
    fn staging_purge_removes_files_and_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("perf_test_source.dat"), b"x").unwrap();
        let cleaner = Cleaner::new(dir.path().join("absent"), Some(staging.clone()));
        let sink = MemorySink::new();
        assert!(cleaner.complete_cleanup(&sink));
        assert!(!staging.exists());
    }

    #[test]
    fn staging_subdirectories_are_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(staging.join("keep")).unwrap();
        fs::write(staging.join("perf_test_source.dat"), b"x").unwrap();
        let cleaner = Cleaner::new(dir.path().join("absent"), Some(staging.clone()));
        let sink = MemorySink::new();
        assert!(cleaner.cleanup_staging(&sink));
        assert!(staging.join("keep").exists());
        assert!(!staging.join("perf_test_source.dat").exists());
    }

    #[test]
    fn staging_purge_only_reaches_the_work_directory() {
        let device = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let config = SuiteConfig::default().with_staging_dir(scratch.path());
        let target = DeviceTarget::new(device.path(), 0, 0);
        let work = config.staging_work_dir().unwrap();
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("perf_test_source.dat"), b"x").unwrap();
        fs::write(scratch.path().join("notes.txt"), b"mine").unwrap();

        let sink = MemorySink::new();
        assert!(Cleaner::for_target(&config, &target).complete_cleanup(&sink));
        assert!(!work.exists());
        assert!(scratch.path().join("notes.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn read_only_subdir_escalates_or_reports() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("USBTestData");
        let locked = root.join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("pinned.bin"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        let sink = MemorySink::new();
        let cleaner = Cleaner::new(&root, None);
        let ok = cleaner.complete_cleanup(&sink);

        // Privileged runs can delete through the read-only bit.
        if root.exists() {
            assert!(!ok);
            assert!(sink.contains("escalating"));
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            assert!(cleaner.complete_cleanup(&MemorySink::new()));
        } else {
            assert!(ok);
        }
        assert!(!root.exists());
    }
}
