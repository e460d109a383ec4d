//! Build script for pios-rtos.
//!
//! With the `threadx` feature, compiles the ThreadX services the backend
//! calls into a static library. The kernel sources are expected next to the
//! workspace (`../threadx`, override with `THREADX_DIR`), for the port named
//! by `THREADX_PORT` (default `cortex_r5/gnu`). The low-level initialization
//! and linker script stay with the firmware image.

#![cfg_attr(not(feature = "threadx"), allow(dead_code))]

use std::error::Error;

static TX_PORT_FILES: &[&str] = &[
    "tx_thread_context_restore.S",
    "tx_thread_context_save.S",
    "tx_thread_fiq_context_restore.S",
    "tx_thread_fiq_context_save.S",
    "tx_thread_fiq_nesting_end.S",
    "tx_thread_fiq_nesting_start.S",
    "tx_thread_interrupt_control.S",
    "tx_thread_interrupt_disable.S",
    "tx_thread_interrupt_restore.S",
    "tx_thread_irq_nesting_end.S",
    "tx_thread_irq_nesting_start.S",
    "tx_thread_schedule.S",
    "tx_thread_stack_build.S",
    "tx_thread_system_return.S",
    "tx_thread_vectored_context_save.S",
    "tx_timer_interrupt.S",
];

static TX_COMMON_FILES: &[&str] = &[
    // Block pool (queue slots)
    "tx_block_allocate.c",
    "tx_block_pool_cleanup.c",
    "tx_block_pool_create.c",
    "tx_block_pool_initialize.c",
    "tx_block_release.c",
    // Byte pool (kernel heap, control blocks, stacks)
    "tx_byte_allocate.c",
    "tx_byte_pool_cleanup.c",
    "tx_byte_pool_create.c",
    "tx_byte_pool_initialize.c",
    "tx_byte_pool_search.c",
    "tx_byte_release.c",
    // Initialization
    "tx_initialize_high_level.c",
    "tx_initialize_kernel_enter.c",
    "tx_initialize_kernel_setup.c",
    // Mutex
    "tx_mutex_cleanup.c",
    "tx_mutex_create.c",
    "tx_mutex_get.c",
    "tx_mutex_initialize.c",
    "tx_mutex_prioritize.c",
    "tx_mutex_priority_change.c",
    "tx_mutex_put.c",
    // Queue (mailboxes)
    "tx_queue_cleanup.c",
    "tx_queue_create.c",
    "tx_queue_initialize.c",
    "tx_queue_receive.c",
    "tx_queue_send.c",
    // Thread
    "tx_thread_create.c",
    "tx_thread_delete.c",
    "tx_thread_identify.c",
    "tx_thread_initialize.c",
    "tx_thread_relinquish.c",
    "tx_thread_shell_entry.c",
    "tx_thread_sleep.c",
    "tx_thread_system_preempt_check.c",
    "tx_thread_system_resume.c",
    "tx_thread_system_suspend.c",
    "tx_thread_terminate.c",
    "tx_thread_time_slice.c",
    "tx_thread_timeout.c",
    // Time
    "tx_time_get.c",
    "tx_timer_expiration_process.c",
    "tx_timer_initialize.c",
    "tx_timer_system_activate.c",
    "tx_timer_system_deactivate.c",
    "tx_timer_thread_entry.c",
];

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=THREADX_DIR");
    println!("cargo:rerun-if-env-changed=THREADX_PORT");

    #[cfg(feature = "threadx")]
    build_threadx()?;

    Ok(())
}

#[cfg(feature = "threadx")]
fn build_threadx() -> Result<(), Box<dyn Error>> {
    use std::{env, path::PathBuf};

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let tx_dir = env::var_os("THREADX_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| crate_dir.join("../threadx"));
    let port = env::var("THREADX_PORT").unwrap_or_else(|_| "cortex_r5/gnu".to_string());

    let tx_common_dir = tx_dir.join("common/src");
    let tx_common_inc = tx_dir.join("common/inc");
    let tx_port_dir = tx_dir.join("ports").join(&port).join("src");
    let tx_port_inc = tx_dir.join("ports").join(&port).join("inc");
    println!("cargo:rerun-if-changed={}", tx_dir.display());

    cc::Build::new()
        .include(&tx_common_inc)
        .include(&tx_port_inc)
        .flag("-g")
        .flag("-ffunction-sections")
        .flag("-fdata-sections")
        .flag("-fno-unwind-tables")
        .flag("-fno-asynchronous-unwind-tables")
        // Defines that change struct layouts must match the threadx-sys
        // bindings; these two only touch code paths.
        .define("TX_DISABLE_ERROR_CHECKING", "1")
        .define("TX_DISABLE_REDUNDANT_CLEARING", "1")
        .define("TX_ENABLE_VFP_SUPPORT", "1")
        .files(TX_PORT_FILES.iter().map(|&s| tx_port_dir.join(s)))
        .files(TX_COMMON_FILES.iter().map(|&s| tx_common_dir.join(s)))
        .compile("threadx");

    Ok(())
}
