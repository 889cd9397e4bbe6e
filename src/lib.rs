//! Removable-media validation: five I/O workloads run against a mounted
//! volume, plus the cleanup that leaves the volume as it was found.

pub mod cleaner;
pub mod config;
pub mod device_target;
pub mod error;
pub mod modules;
pub mod orchestrator;
pub mod payload;
pub mod sink;

pub use cleaner::Cleaner;
pub use config::SuiteConfig;
pub use device_target::DeviceTarget;
pub use error::{Result, SuiteError};
pub use modules::{TestKind, TestModule, TestOutcome};
pub use orchestrator::{Orchestrator, SuiteOutcome};
pub use sink::{ConsoleSink, Level, MemorySink, MessageSink};
