//! docker-machine-driver-vcd: Docker Machine driver for VMware vCloud Director
//!
//! Each invocation runs one driver operation against the machine store and
//! exits. Results go to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::Parser;

use docker_machine_driver_vcd::cli::{self, Cli};
use docker_machine_driver_vcd::logging;
use docker_machine_driver_vcd::paths::DriverPaths;

fn main() -> Result<()> {
    let args = Cli::parse();

    let paths = DriverPaths::resolve(args.storage_path.clone())
        .context("HOME is not set; cannot resolve the machine store")?;
    let _log_guard = logging::init(Some(paths.logs.as_path()));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(cli::run(args, paths))
}
