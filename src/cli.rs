//! Command-line surface: one subcommand per driver operation.
//!
//! `create` merges flags, environment and the defaults file into a
//! [`DriverConfig`](crate::config::DriverConfig) and writes the machine
//! record before provisioning, adding the locators once the machine is up.
//! Every other machine command loads that record, runs, and writes the
//! (possibly updated) locators back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::builder::{BoolishValueParser, NonEmptyStringValueParser};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::config::{ConfigLayer, create_flags};
use crate::driver::Driver;
use crate::paths::DriverPaths;
use crate::store::{DRIVER_NAME, MachineRecord};
use crate::vcd::{Connector, HttpConnector};

/// Docker Machine driver for VMware vCloud Director
#[derive(Parser, Debug)]
#[command(
    name = "docker-machine-driver-vcd",
    version,
    about = "Docker Machine driver for VMware vCloud Director"
)]
pub struct Cli {
    /// Machine store root
    #[arg(long, env = "MACHINE_STORAGE_PATH", global = true)]
    pub storage_path: Option<PathBuf>,

    /// TOML file with default create options
    #[arg(long, global = true)]
    pub defaults_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the driver name
    DriverName,
    /// List the options `create` accepts
    Flags,
    /// Compose, configure and boot a new machine
    Create {
        /// Machine name
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        name: String,
        #[command(flatten)]
        flags: CreateArgs,
    },
    /// Power on
    Start(MachineArgs),
    /// Graceful shutdown
    Stop(MachineArgs),
    /// Reboot
    Restart(MachineArgs),
    /// Hard power off
    Kill(MachineArgs),
    /// Power off and delete the vApp
    Rm(MachineArgs),
    /// Print Running, Stopped, Error or an empty line
    State(MachineArgs),
    /// Print the machine's IP address
    Ip(MachineArgs),
    /// Print the SSH hostname
    SshHostname(MachineArgs),
    /// Print the Docker URL
    Url(MachineArgs),
}

#[derive(Args, Debug)]
pub struct MachineArgs {
    /// Machine name
    #[arg(value_parser = NonEmptyStringValueParser::new())]
    pub name: String,
}

/// Options accepted by `create`; unset values fall through to the defaults
/// file and then the built-in defaults.
#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    #[arg(long = "vcd-url", env = "VCD_URL")]
    pub url: Option<String>,
    #[arg(long = "vcd-org", env = "VCD_ORG")]
    pub org: Option<String>,
    #[arg(long = "vcd-vdc", env = "VCD_VDC")]
    pub vdc: Option<String>,
    #[arg(
        long = "vcd-insecure",
        env = "VCD_INSECURE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub insecure: Option<bool>,
    #[arg(long = "vcd-user", env = "VCD_USERNAME")]
    pub user: Option<String>,
    #[arg(long = "vcd-password", env = "VCD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long = "vcd-orgvdcnetwork", env = "VCD_ORGVDCNETWORK")]
    pub orgvdcnetwork: Option<String>,
    #[arg(long = "vcd-catalog", env = "VCD_CATALOG")]
    pub catalog: Option<String>,
    #[arg(long = "vcd-template", env = "VCD_TEMPLATE")]
    pub template: Option<String>,
    #[arg(long = "vcd-numcpus", env = "VCD_NUMCPUS")]
    pub numcpus: Option<u32>,
    #[arg(long = "vcd-corespersocket", env = "VCD_CORESPERSOCKET")]
    pub corespersocket: Option<u32>,
    #[arg(long = "vcd-memory-size-mb", env = "VCD_MEMORY_SIZE_MB")]
    pub memory_size_mb: Option<u32>,
    #[arg(long = "vcd-storageprofile", env = "VCD_STORAGEPROFILE")]
    pub storageprofile: Option<String>,
    #[arg(long = "vcd-description", env = "VCD_DESCRIPTION")]
    pub description: Option<String>,
    #[arg(long = "vcd-docker-port", env = "VCD_DOCKER_PORT")]
    pub docker_port: Option<u16>,
    #[arg(long = "vcd-ssh-port", env = "VCD_SSH_PORT")]
    pub ssh_port: Option<u16>,
    #[arg(
        long = "vcd-delete-when-failed",
        env = "VCD_DELETE_WHEN_FAILED",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub delete_when_failed: Option<bool>,
    #[arg(long = "vcd-name-prefix", env = "VCD_NAME_PREFIX")]
    pub name_prefix: Option<String>,
}

impl CreateArgs {
    pub fn into_layer(self) -> ConfigLayer {
        ConfigLayer {
            url: self.url,
            org: self.org,
            vdc: self.vdc,
            insecure: self.insecure,
            user: self.user,
            password: self.password,
            orgvdcnetwork: self.orgvdcnetwork,
            catalog: self.catalog,
            template: self.template,
            numcpus: self.numcpus,
            corespersocket: self.corespersocket,
            memory_size_mb: self.memory_size_mb,
            storageprofile: self.storageprofile,
            description: self.description,
            docker_port: self.docker_port,
            ssh_port: self.ssh_port,
            delete_when_failed: self.delete_when_failed,
            name_prefix: self.name_prefix,
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MachineOp {
    Start,
    Stop,
    Restart,
    Kill,
    Remove,
    State,
    Ip,
    SshHostname,
    Url,
}

pub async fn run(cli: Cli, paths: DriverPaths) -> anyhow::Result<()> {
    let connector: Arc<dyn Connector> = Arc::new(HttpConnector);

    let (name, op) = match cli.command {
        Command::DriverName => {
            println!("{DRIVER_NAME}");
            return Ok(());
        }
        Command::Flags => {
            print_flags();
            return Ok(());
        }
        Command::Create { name, flags } => {
            let defaults_file = cli.defaults_file.unwrap_or_else(|| paths.defaults_file());
            return create(&paths, connector, &name, flags, defaults_file).await;
        }
        Command::Start(m) => (m.name, MachineOp::Start),
        Command::Stop(m) => (m.name, MachineOp::Stop),
        Command::Restart(m) => (m.name, MachineOp::Restart),
        Command::Kill(m) => (m.name, MachineOp::Kill),
        Command::Rm(m) => (m.name, MachineOp::Remove),
        Command::State(m) => (m.name, MachineOp::State),
        Command::Ip(m) => (m.name, MachineOp::Ip),
        Command::SshHostname(m) => (m.name, MachineOp::SshHostname),
        Command::Url(m) => (m.name, MachineOp::Url),
    };

    run_machine_op(&paths, connector, &name, op).await
}

fn print_flags() {
    for flag in create_flags() {
        let default = flag.default.as_deref().unwrap_or("");
        println!("--{:<24} {:<24} {:<16} {}", flag.name, flag.env, default, flag.usage);
    }
}

/// The record is written before provisioning starts, so a create that
/// fails halfway still leaves something `rm` can load. The locators are
/// added once the machine is up.
async fn create(
    paths: &DriverPaths,
    connector: Arc<dyn Connector>,
    name: &str,
    flags: CreateArgs,
    defaults_file: PathBuf,
) -> anyhow::Result<()> {
    let file = ConfigLayer::load(&defaults_file)?;
    let config = flags.into_layer().or(file).into_config()?;

    let record_path = paths.record_path(name);
    if record_path.exists() {
        let existing = MachineRecord::load(&record_path)
            .with_context(|| format!("loading machine {name:?}"))?;
        if !existing.handle.is_empty() {
            bail!("machine {name:?} already exists at {}", record_path.display());
        }
        info!(machine = %name, "Retrying create of a machine that never finished provisioning");
    }
    paths.ensure_machine_dir(name)?;

    let mut driver = Driver::new(name, config, paths.ssh_key_path(name), connector);
    driver.pre_create_check()?;

    let mut record = MachineRecord::new(
        name,
        driver.vapp_name(),
        driver.config().clone(),
        driver.handle().clone(),
    );
    record.save(&record_path)?;

    driver
        .create()
        .await
        .with_context(|| format!("creating machine {name:?}"))?;

    record.handle = driver.handle().clone();
    record.save(&record_path)?;
    info!(machine = %name, vapp = %driver.vapp_name(), "Machine created");
    Ok(())
}

async fn run_machine_op(
    paths: &DriverPaths,
    connector: Arc<dyn Connector>,
    name: &str,
    op: MachineOp,
) -> anyhow::Result<()> {
    let record_path = paths.record_path(name);
    let mut record = MachineRecord::load(&record_path)
        .with_context(|| format!("loading machine {name:?}"))?;

    let mut driver = Driver::new(
        name,
        record.config.clone(),
        paths.ssh_key_path(name),
        connector,
    )
    .with_vapp_name(record.vapp_name.clone())
    .with_handle(record.handle.clone());

    let outcome = dispatch(&mut driver, op).await;

    if op == MachineOp::Remove && outcome.is_ok() {
        paths.remove_machine_dir(name)?;
    } else if *driver.handle() != record.handle {
        record.handle = driver.handle().clone();
        record.save(&record_path)?;
    }

    match outcome {
        Ok(Some(line)) => {
            println!("{line}");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            if op == MachineOp::State {
                println!("Error");
            }
            Err(e).with_context(|| format!("machine {name:?}"))
        }
    }
}

async fn dispatch(driver: &mut Driver, op: MachineOp) -> crate::error::Result<Option<String>> {
    match op {
        MachineOp::Start => driver.start().await.map(|_| None),
        MachineOp::Stop => driver.stop().await.map(|_| None),
        MachineOp::Restart => driver.restart().await.map(|_| None),
        MachineOp::Kill => driver.kill().await.map(|_| None),
        MachineOp::Remove => driver.remove().await.map(|_| None),
        MachineOp::State => driver.get_state().await.map(|s| Some(s.to_string())),
        MachineOp::Ip => driver.get_ip().await.map(Some),
        MachineOp::SshHostname => driver.get_ssh_hostname().await.map(Some),
        MachineOp::Url => driver.get_url().await.map(Some),
    }
}
