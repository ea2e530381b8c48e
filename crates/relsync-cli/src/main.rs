//! relsync unified CLI.
//!
//! Replays a permission-graph change log against the resource inventory
//! and converges the graph with what inventory currently reports.
//!
//! # Quick Start
//!
//! ```bash
//! # Audit what a log would change, without mutating anything
//! RELSYNC_DRY_RUN=true relsync changelog.txt
//!
//! # Reconcile for real
//! relsync changelog.txt
//! ```

mod config;
mod run;

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use crate::config::Settings;

/// Reconcile permission-graph relationship tuples against the resource
/// inventory, one change-log line at a time.
#[derive(Parser)]
#[command(name = "relsync")]
#[command(author, version, long_about = None)]
struct Cli {
    /// Path to the change-log input file.
    input: PathBuf,

    /// Narrate commands without mutating the relationship store.
    #[arg(long)]
    dry_run: bool,

    /// Relationship store CLI binary.
    #[arg(long, value_name = "BIN")]
    zed_bin: Option<String>,

    /// Inventory query CLI binary.
    #[arg(long, value_name = "BIN")]
    gabi_bin: Option<String>,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Usage errors exit 1; --help and --version stay conventional.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = i32::from(error.use_stderr());
            let _ = error.print();
            exit(code);
        }
    };

    let settings = Settings::resolve(cli.dry_run, cli.zed_bin, cli.gabi_bin);

    if let Err(error) = run::run(&cli.input, &settings) {
        eprintln!("error: {error:#}");
        exit(failure_exit_code(&error));
    }
}

/// Exit code for a failed run: the exact code of the first failing store
/// command when one is in the chain, 1 otherwise.
fn failure_exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<relsync_graph::Error>())
        .and_then(relsync_graph::Error::exit_code)
        .unwrap_or(1)
}
