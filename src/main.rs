//! Main entry point for the registry-sync CLI.
//!
//! Exit codes: 0 when every image synced (or the dry run completed), 1 when
//! any image failed, 2 on setup errors such as missing configuration or
//! rejected credentials.

use registry_sync::cli::{Args, Runner};
use std::process::ExitCode;

const EXIT_IMAGE_FAILURES: u8 = 1;
const EXIT_SETUP_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("❌ ERROR: {}", e);
        return ExitCode::from(EXIT_SETUP_ERROR);
    }

    let runner = match Runner::from_args(&args) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("❌ ERROR: {}", e);
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    // First Ctrl-C stops dispatching; images already in flight finish
    let cancel = runner.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⚠️  Interrupted: finishing in-flight images, no new images will start");
            cancel.cancel();
        }
    });

    match runner.run().await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_IMAGE_FAILURES),
        Err(e) => {
            eprintln!("❌ ERROR: {}", e);
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}
