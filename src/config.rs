use std::path::PathBuf;
use std::time::Duration;

use crate::device_target::DeviceTarget;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Every tunable of a validation run. `Default` reproduces the stock suite.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Directory created under the device root that holds all artifacts.
    pub test_dir_name: String,
    /// External fast local scratch area used by the performance module.
    /// Must already exist; the suite works in a subdirectory of it.
    pub staging_dir: Option<PathBuf>,

    pub small_file_size: u64,
    pub medium_file_size: u64,
    pub large_file_size: u64,

    pub integrity_file_count: usize,
    pub integrity_file_size: u64,

    pub performance_payload_bytes: u64,
    pub staging_write_chunk: u64,
    pub copy_chunk_size: u64,
    pub read_chunk_size: u64,
    /// Largest single file a legacy (FAT32) volume accepts.
    pub single_file_ceiling: u64,
    /// Headroom required on top of the payload before a transfer starts.
    pub space_margin_bytes: u64,
    pub settle_pause: Duration,
    pub progress_interval_bytes: u64,

    pub stress_workers: usize,
    pub stress_file_size: u64,
    pub stress_duration: Duration,
    pub stress_join_timeout: Duration,

    pub stability_file_size: u64,
    pub stability_duration: Duration,
    pub stability_report_every: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        SuiteConfig {
            test_dir_name: "USBTestData".to_string(),
            staging_dir: None,
            small_file_size: KIB,
            medium_file_size: MIB,
            large_file_size: 10 * MIB,
            integrity_file_count: 50,
            integrity_file_size: KIB,
            performance_payload_bytes: 2 * GIB,
            staging_write_chunk: 10 * MIB,
            copy_chunk_size: 100 * MIB,
            read_chunk_size: MIB,
            single_file_ceiling: 4 * GIB,
            space_margin_bytes: GIB,
            settle_pause: Duration::from_secs(3),
            progress_interval_bytes: 500 * MIB,
            stress_workers: 3,
            stress_file_size: KIB,
            stress_duration: Duration::from_secs(30),
            stress_join_timeout: Duration::from_secs(1),
            stability_file_size: 4 * KIB,
            stability_duration: Duration::from_secs(60),
            stability_report_every: 100,
        }
    }
}

impl SuiteConfig {
    /// The single directory on the device that every module writes under.
    pub fn test_root(&self, target: &DeviceTarget) -> PathBuf {
        target.root_path().join(&self.test_dir_name)
    }

    /// The directory the suite owns inside the configured staging area.
    /// Only this directory is ever written to or purged.
    pub fn staging_work_dir(&self) -> Option<PathBuf> {
        self.staging_dir.as_ref().map(|dir| dir.join(&self.test_dir_name))
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }
}

pub fn parse_size_with_suffix(s: &str) -> Result<u64, String> {
    let s_trimmed = s.trim();
    if s_trimmed.is_empty() {
        return Err("Input string is empty".to_string());
    }
    let first_non_digit_idx = s_trimmed.find(|c: char| !c.is_ascii_digit());
    let (num_str, suffix_orig) = match first_non_digit_idx {
        Some(0) => {
            return Err(format!("Invalid format: missing numeric value in '{}'", s_trimmed));
        }
        Some(idx) => s_trimmed.split_at(idx),
        None => (s_trimmed, ""),
    };
    let num = num_str
        .parse::<u64>()
        .map_err(|_| format!("Invalid number: '{}' in '{}'", num_str, s_trimmed))?;
    let suffix = suffix_orig.trim_start().to_uppercase();
    match suffix.as_str() {
        "" | "B" => Ok(num),
        "K" | "KB" | "KIB" => Ok(num.saturating_mul(KIB)),
        "M" | "MB" | "MIB" => Ok(num.saturating_mul(MIB)),
        "G" | "GB" | "GIB" => Ok(num.saturating_mul(GIB)),
        "T" | "TB" | "TIB" => Ok(num.saturating_mul(GIB * 1024)),
        _ => Err(format!(
            "Unknown or misplaced size suffix: '{}' in '{}'",
            suffix_orig, s_trimmed
        )),
    }
}

/// Whole seconds, for clap.
pub fn parse_duration_secs(s: &str) -> Result<Duration, String> {
    s.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("Invalid duration in seconds: '{}'", s))
}
