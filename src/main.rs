//! src/main.rs
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use sysinfo::System;

use media_validator::config::{parse_duration_secs, parse_size_with_suffix};
use media_validator::device_target::format_bytes;
use media_validator::{ConsoleSink, DeviceTarget, Level, MessageSink, Orchestrator, SuiteConfig, TestKind};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Validate removable storage media with a battery of I/O workloads", long_about = None)]
struct Cli {
    /// Mount point (or drive root) of the volume under test.
    #[clap(long)]
    path: PathBuf,
    /// Comma-separated tests to run, in order. Defaults to all five.
    #[clap(long, value_delimiter = ',')]
    tests: Vec<String>,
    /// Existing fast local scratch directory; payloads go in a subdirectory the suite owns.
    #[clap(long)]
    staging_dir: Option<PathBuf>,
    #[clap(long, value_parser = parse_size_with_suffix, default_value = "2G")]
    payload_size: u64,
    #[clap(long, value_parser = parse_duration_secs, default_value = "30")]
    stress_secs: Duration,
    #[clap(long, value_parser = parse_duration_secs, default_value = "60")]
    stability_secs: Duration,
    #[clap(long, default_value = "media_validator.log")]
    log_file: PathBuf,
    /// Include DEBUG messages.
    #[clap(long)]
    verbose: bool,
    /// Print a JSON summary to stdout.
    #[clap(long)]
    json: bool,
}

fn current_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn host_info() -> String {
    format!(
        "Host: {}, OS: {}, Architecture: {}",
        System::host_name().unwrap_or_else(|| "unknown".into()),
        System::long_os_version().unwrap_or_else(|| std::env::consts::OS.into()),
        std::env::consts::ARCH
    )
}

fn setup_signal_handler(flag: Arc<AtomicBool>, sink: Arc<ConsoleSink>) {
    let installed = ctrlc::set_handler(move || {
        sink.warn("Received Ctrl+C; finishing the current test, then cleaning up...");
        flag.store(true, Ordering::SeqCst);
    });
    if let Err(e) = installed {
        eprintln!("[{}] Could not install Ctrl+C handler: {}", current_timestamp(), e);
    }
}

fn open_log_file(path: &Path) -> Option<Arc<Mutex<File>>> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(Arc::new(Mutex::new(f))),
        Err(e) => {
            eprintln!(
                "[{}] Failed to open log file '{}': {}. Further logs will only go to stderr.",
                current_timestamp(),
                path.display(),
                e
            );
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let log_file = open_log_file(&cli.log_file);
    let min_level = if cli.verbose { Level::Debug } else { Level::Info };
    let sink = Arc::new(ConsoleSink::new(log_file.clone(), min_level));

    let main_result = panic::catch_unwind(panic::AssertUnwindSafe(|| main_logic(cli, Arc::clone(&sink))));
    let exit_code = match main_result {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            sink.error(&format!("Run failed: {}", e));
            1
        }
        Err(panic_payload) => {
            let mut panic_msg = format!("[{}] A critical error occurred: run panicked!", current_timestamp());
            if let Some(s) = panic_payload.downcast_ref::<String>() {
                panic_msg.push_str(&format!("\nPanic message: {}", s));
            } else if let Some(s) = panic_payload.downcast_ref::<&str>() {
                panic_msg.push_str(&format!("\nPanic message: {}", s));
            }
            eprintln!("{}", panic_msg);
            if let Some(ref lf_arc) = log_file {
                let mut lf_guard = lf_arc.lock();
                let _ = writeln!(*lf_guard, "{}", panic_msg);
                let _ = lf_guard.flush();
            }
            101
        }
    };
    std::process::exit(exit_code);
}

fn main_logic(cli: Cli, sink: Arc<ConsoleSink>) -> io::Result<i32> {
    let interrupt = Arc::new(AtomicBool::new(false));
    setup_signal_handler(Arc::clone(&interrupt), Arc::clone(&sink));

    sink.info("Starting removable media validation...");
    sink.debug(&format!("CLI: {:?}", cli));
    sink.info(&host_info());

    let target = DeviceTarget::probe(&cli.path).map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))?;
    let (total, total_unit) = format_bytes(target.total_bytes());
    let (free, free_unit) = format_bytes(target.free_bytes());
    sink.info(&format!(
        "Target {}: {:.2} {} total, {:.2} {} free",
        target.root_path().display(),
        total,
        total_unit,
        free,
        free_unit
    ));

    let config = SuiteConfig {
        staging_dir: cli.staging_dir.clone(),
        performance_payload_bytes: cli.payload_size,
        stress_duration: cli.stress_secs,
        stability_duration: cli.stability_secs,
        ..SuiteConfig::default()
    };
    if config.staging_dir.is_none() {
        sink.debug("No --staging-dir given; the performance test will fail if selected");
    }

    let names: Vec<String> = if cli.tests.is_empty() {
        TestKind::ALL.iter().map(|k| k.name().to_string()).collect()
    } else {
        cli.tests.iter().map(|t| t.trim().to_string()).collect()
    };
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let pb = Arc::new(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("validating...");
    pb.enable_steady_tick(Duration::from_millis(200));
    sink.attach_progress(Arc::clone(&pb));

    let orchestrator = Orchestrator::new(config).with_interrupt(interrupt);
    let outcome = orchestrator.run_selected(&target, sink.as_ref(), &name_refs);

    pb.finish_and_clear();
    sink.detach_progress();

    if cli.json {
        println!("{}", outcome.to_json());
    }
    let code = match (outcome.all_passed, outcome.cleanup_ok) {
        (true, true) => {
            sink.info("All selected tests passed.");
            0
        }
        (true, false) => {
            sink.warn("All selected tests passed, but cleanup left residue on the device.");
            2
        }
        (false, _) => {
            sink.error("One or more tests failed.");
            1
        }
    };
    Ok(code)
}
