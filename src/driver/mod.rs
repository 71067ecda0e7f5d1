//! The vCloud Director machine driver.
//!
//! A [`Driver`] is a [`DriverConfig`] plus the [`VmHandle`] locators and the
//! connector used to open a fresh session for every call:
//!
//! ```text
//! Driver::create()
//!     └─► session ─► org ─► vdc ─► network/catalog/item/template ─► storage profile
//!             └─► composeVApp task ─► exactly one VM
//!                     ├─► monitor: poll VM status every 5 s until POWERED_OFF (15 min deadline)
//!                     ├─► hardware spec ─► network connection ─► guest customization
//!                     └─► power on
//! ```
//!
//! Lifecycle calls and queries live in [`lifecycle`] and [`query`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{self, CreateFlag, DriverConfig};
use crate::error::{Error, Result};
use crate::store::DRIVER_NAME;
use crate::vcd::types::{Task, VApp, Vdc, Vm};
use crate::vcd::{Connector, Session, TaskWait, wait_for_task};

pub mod create;
pub mod customization;
pub mod lifecycle;
pub mod monitor;
pub mod query;

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// Remote locators of the machine's vApp and VM. The only state persisted
/// between driver invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VmHandle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vapp_href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_href: Option<String>,
}

impl VmHandle {
    pub fn is_empty(&self) -> bool {
        self.vapp_href.is_none() && self.vm_href.is_none()
    }

    pub fn clear(&mut self) {
        self.vapp_href = None;
        self.vm_href = None;
    }
}

/// Machine state as reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Running,
    Stopped,
    Error,
    /// Status the driver does not recognise.
    None,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MachineState::Running => "Running",
            MachineState::Stopped => "Stopped",
            MachineState::Error => "Error",
            MachineState::None => "",
        };
        f.write_str(s)
    }
}

/// Poll cadences and deadlines.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Interval between VM status reads while waiting for the composed VM.
    pub power_poll_interval: Duration,
    /// Overall deadline for the composed VM to reach powered-off.
    pub deploy_timeout: Duration,
    pub task: TaskWait,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            power_poll_interval: Duration::from_secs(5),
            deploy_timeout: Duration::from_secs(15 * 60),
            task: TaskWait::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Driver {
    machine_name: String,
    vapp_name: String,
    config: DriverConfig,
    handle: VmHandle,
    ssh_key_path: PathBuf,
    connector: Arc<dyn Connector>,
    timings: Timings,
}

impl Driver {
    pub fn new(
        machine_name: impl Into<String>,
        config: DriverConfig,
        ssh_key_path: impl Into<PathBuf>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let machine_name = machine_name.into();
        let vapp_name = vapp_name(&config.name_prefix, &machine_name);
        Self {
            machine_name,
            vapp_name,
            config,
            handle: VmHandle::default(),
            ssh_key_path: ssh_key_path.into(),
            connector,
            timings: Timings::default(),
        }
    }

    /// Restore locators saved by an earlier invocation.
    pub fn with_handle(mut self, handle: VmHandle) -> Self {
        self.handle = handle;
        self
    }

    /// Restore the vApp name recorded at create time. An empty name keeps
    /// the derived one.
    pub fn with_vapp_name(mut self, vapp_name: impl Into<String>) -> Self {
        let vapp_name = vapp_name.into();
        if !vapp_name.is_empty() {
            self.vapp_name = vapp_name;
        }
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    pub fn create_flags() -> Vec<CreateFlag> {
        config::create_flags()
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    pub fn vapp_name(&self) -> &str {
        &self.vapp_name
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn handle(&self) -> &VmHandle {
        &self.handle
    }

    pub fn ssh_username(&self) -> &'static str {
        config::SSH_USER
    }

    pub fn ssh_port(&self) -> u16 {
        self.config.ssh_port
    }

    pub fn ssh_key_path(&self) -> &Path {
        &self.ssh_key_path
    }

    /// Everything that can be checked without the network.
    pub fn pre_create_check(&self) -> Result<()> {
        self.config.validate()
    }

    // -----------------------------------------------------------------------
    // Session helpers
    // -----------------------------------------------------------------------

    async fn open_session(&self) -> Result<Arc<dyn Session>> {
        let credentials = self.config.credentials()?;
        let session = self.connector.connect(&credentials).await?;
        Ok(Arc::from(session))
    }

    async fn locate_vdc(&self, session: &dyn Session) -> Result<Vdc> {
        let org = session.find_org(&self.config.org).await?;
        session.find_vdc(&org, &self.config.vdc).await
    }

    async fn wait(&self, session: &dyn Session, task: Task, operation: &str) -> Result<()> {
        wait_for_task(session, task, operation, self.timings.task).await
    }

    /// The machine's vApp, by stored locator when there is one, else by name.
    async fn resolve_vapp(&mut self, session: &dyn Session) -> Result<VApp> {
        if let Some(href) = &self.handle.vapp_href {
            return session.get_vapp(href).await;
        }
        let vdc = self.locate_vdc(session).await?;
        let vapp = session.find_vapp(&vdc, &self.vapp_name).await?;
        self.handle.vapp_href = Some(vapp.href.clone());
        Ok(vapp)
    }

    /// The machine's VM, by stored locator when there is one, else as the
    /// single child of the vApp.
    async fn resolve_vm(&mut self, session: &dyn Session) -> Result<Vm> {
        if let Some(href) = &self.handle.vm_href {
            return session.get_vm(href).await;
        }
        let vapp = self.resolve_vapp(session).await?;
        let child = create::single_vm(&vapp)?;
        let vm = session.get_vm(&child.href).await?;
        self.handle.vm_href = Some(vm.href.clone());
        Ok(vm)
    }
}

/// Disconnect `session` and hand back `result`. A failed logout is only
/// logged; it never masks the outcome of the call.
async fn close<T>(session: Arc<dyn Session>, result: Result<T>) -> Result<T> {
    if let Err(e) = session.disconnect().await {
        warn!(error = %e, "session logout failed");
    }
    result
}

/// `<prefix>-<machine>` when a prefix is set, else the machine name. An
/// empty machine name gets a generated one.
pub fn vapp_name(prefix: &str, machine_name: &str) -> String {
    match (prefix.is_empty(), machine_name.is_empty()) {
        (_, true) => generate_name(prefix),
        (true, false) => machine_name.to_string(),
        (false, false) => format!("{prefix}-{machine_name}"),
    }
}

/// `<prefix>-<12 hex chars>`, with `docker-machine` as the fallback prefix.
pub fn generate_name(prefix: &str) -> String {
    let prefix = if prefix.is_empty() { "docker-machine" } else { prefix };
    let mut id = [0u8; 6];
    rand::rng().fill(&mut id);
    let hex: String = id.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}-{hex}")
}
