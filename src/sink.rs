use std::fmt;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use chrono::Local;
use indicatif::ProgressBar;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        })
    }
}

/// Where the core sends every message it produces.
///
/// Implementations must tolerate calls from any thread. Anything that has to
/// happen on a particular thread (a UI loop, say) is the implementation's job.
pub trait MessageSink: Send + Sync {
    fn log(&self, message: &str, level: Level);

    fn debug(&self, message: &str) {
        self.log(message, Level::Debug);
    }
    fn info(&self, message: &str) {
        self.log(message, Level::Info);
    }
    fn warn(&self, message: &str) {
        self.log(message, Level::Warning);
    }
    fn error(&self, message: &str) {
        self.log(message, Level::Error);
    }
}

fn current_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Timestamped lines to stderr (or above a progress bar), mirrored to an
/// optional log file.
pub struct ConsoleSink {
    log_file: Option<Arc<Mutex<File>>>,
    progress: Mutex<Option<Arc<ProgressBar>>>,
    min_level: Level,
}

impl ConsoleSink {
    pub fn new(log_file: Option<Arc<Mutex<File>>>, min_level: Level) -> Self {
        ConsoleSink {
            log_file,
            progress: Mutex::new(None),
            min_level,
        }
    }

    /// Route console output through `pb` so lines don't tear the bar.
    pub fn attach_progress(&self, pb: Arc<ProgressBar>) {
        *self.progress.lock() = Some(pb);
    }

    pub fn detach_progress(&self) {
        *self.progress.lock() = None;
    }

    fn write_line(&self, full_message: String) {
        match self.progress.lock().as_ref() {
            Some(pb) => pb.println(full_message.as_str()),
            None => eprintln!("{}", full_message),
        }
        if let Some(ref lf_arc) = self.log_file {
            let mut lf_guard = lf_arc.lock();
            let _ = writeln!(*lf_guard, "{}", full_message);
            let _ = lf_guard.flush();
        }
    }
}

impl MessageSink for ConsoleSink {
    fn log(&self, message: &str, level: Level) {
        if level < self.min_level {
            return;
        }
        self.write_line(format!("[{}] [{}] {}", current_timestamp(), level, message));
    }
}

/// Keeps every message in memory.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(_, m)| m.contains(needle))
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.count_containing(needle) > 0
    }

    pub fn count_at(&self, level: Level) -> usize {
        self.entries.lock().iter().filter(|(l, _)| *l == level).count()
    }
}

impl MessageSink for MemorySink {
    fn log(&self, message: &str, level: Level) {
        self.entries.lock().push((level, message.to_string()));
    }
}
