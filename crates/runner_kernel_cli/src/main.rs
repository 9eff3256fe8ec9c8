//! CLI smoke entry point.
//!
//! # Responsibility
//! - Boot a `KernelContext` from `RUNNER_KERNEL_*` environment variables.
//! - Print the kernel status as one JSON line.

use runner_kernel_core::{KernelConfig, KernelContext};
use std::process::ExitCode;

fn main() -> ExitCode {
    let config = KernelConfig::from_env();
    let context = match KernelContext::new(&config) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("runner_kernel boot failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("event=cli_status module=cli status=ok");
    match serde_json::to_string(&context.status()) {
        Ok(status) => {
            println!("{status}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("runner_kernel status encoding failed: {err}");
            ExitCode::FAILURE
        }
    }
}
