//! xtask - Build and test automation for pios-rtos
//!
//! Usage:
//!   cargo xtask test          # Unit, integration and doc tests on the hosted kernel
//!   cargo xtask ui            # Compile-fail tests (trybuild)
//!   cargo xtask check-threadx # Type-check the ThreadX backend for the Cortex-R5 target
//!   cargo xtask help          # Show this help

use anyhow::{bail, Context, Result};
use std::process::Command;

/// Target the ThreadX backend is built for.
const THREADX_TARGET: &str = "armv7r-none-eabihf";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match cmd {
        "test" => host_test()?,
        "ui" => ui_test()?,
        "check-threadx" => check_threadx()?,
        "help" | "--help" | "-h" => print_help(),
        _ => {
            eprintln!("Unknown command: {}", cmd);
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        r#"xtask - pios-rtos build automation

USAGE:
    cargo xtask <command>

COMMANDS:
    test            Run unit, integration and doc tests on the hosted kernel
    ui              Run compile-fail tests
    check-threadx   Type-check the ThreadX backend ({target})
    help            Show this help

ENVIRONMENT:
    RUST_LOG        Log filter for test output (env_logger)

EXAMPLES:
    cargo xtask test
    RUST_LOG=pios_rtos=debug cargo xtask test
    TRYBUILD=overwrite cargo xtask ui   # accept new .stderr snapshots
"#,
        target = THREADX_TARGET
    );
}

fn cargo(args: &[&str], what: &str) -> Result<()> {
    eprintln!("[xtask] {}...", what);
    let status = Command::new(env!("CARGO"))
        .args(args)
        .status()
        .with_context(|| format!("Failed to run cargo {}", args.join(" ")))?;

    if !status.success() {
        bail!("{} failed with status: {}", what, status);
    }

    eprintln!("[xtask] {} PASSED", what);
    Ok(())
}

/// Run the hosted test suite.
///
/// The integration tests share process-wide kernel state (tick offset, heap
/// failure flag), so every test binary runs its tests on one thread.
fn host_test() -> Result<()> {
    cargo(
        &["test", "-p", "pios-rtos", "--", "--test-threads=1"],
        "Host tests",
    )
}

/// Run the trybuild compile-fail suite.
fn ui_test() -> Result<()> {
    cargo(
        &[
            "test",
            "-p",
            "pios-rtos",
            "--features",
            "ui-tests",
            "--test",
            "compile_fail",
        ],
        "Compile-fail tests",
    )
}

/// Check the ThreadX backend without the hosted kernel.
///
/// Needs `threadx-sys/src/bindings.rs` for the target port.
fn check_threadx() -> Result<()> {
    cargo(
        &[
            "check",
            "-p",
            "pios-rtos",
            "--no-default-features",
            "--features",
            "threadx,ffi,stack-fill",
            "--target",
            THREADX_TARGET,
        ],
        "ThreadX check",
    )
}
