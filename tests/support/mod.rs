//! In-memory vCloud control plane shared by the integration tests.
//!
//! `FakeCloud` implements [`Connector`] and hands out sessions that all read
//! and write one `State` behind a mutex. Tests script failures by editing
//! the state before the call and assert on the recorded call log and the
//! captured updates afterwards.
//!
//! The fake holds a single org/vdc/network/catalog/template whose names
//! match [`config()`]. At most one vApp exists at a time.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use docker_machine_driver_vcd::config::DriverConfig;
use docker_machine_driver_vcd::error::{Error, ResourceKind, Result};
use docker_machine_driver_vcd::vcd::types::{
    ApiError, Catalog, CatalogItem, ComposeRequest, GuestCustomizationSection, NetworkConnection,
    NetworkConnectionSection, Org, PowerAction, Reference, Task, TaskStatus, VApp, Vdc, Vm,
    VmSpecSection,
};
use docker_machine_driver_vcd::vcd::{Connector, Credentials, Session, TaskWait};
use docker_machine_driver_vcd::{Driver, Timings};

pub const BASE: &str = "https://vcd.example.com/api";
pub const ORG: &str = "acme";
pub const VDC: &str = "vdc1";
pub const NETWORK: &str = "routed";
pub const CATALOG: &str = "Public";
pub const TEMPLATE: &str = "Ubuntu_Server_20.04";
pub const VAPP_HREF: &str = "https://vcd.example.com/api/vApp/vapp-1";
pub const PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQDfake docker@test";

pub const STATUS_POWERED_ON: i32 = 4;
pub const STATUS_POWERED_OFF: i32 = 8;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeVApp {
    pub name: String,
    pub status: i32,
    pub vm_count: usize,
}

#[derive(Debug)]
pub struct State {
    /// Every connector and session call, in order.
    pub calls: Vec<String>,
    pub reject_login: bool,
    /// Connections still accepted; `None` means unlimited.
    pub connects_allowed: Option<usize>,
    /// VMs placed in the vApp by composition.
    pub vm_count: usize,
    pub storage_profiles: Vec<String>,
    /// Status codes returned by successive VM reads. The last one sticks.
    pub vm_statuses: VecDeque<i32>,
    pub vapp: Option<FakeVApp>,
    pub internal_ip: Option<String>,
    pub external_ip: Option<String>,
    /// HTTP status returned by vApp reads instead of the vApp.
    pub vapp_read_status: Option<u16>,
    /// Session call names whose task ends in `error`.
    pub failing_ops: HashSet<&'static str>,
    failing_tasks: HashSet<String>,
    next_task: usize,

    pub composed: Vec<ComposeRequest>,
    pub spec_updates: Vec<VmSpecSection>,
    pub network_updates: Vec<NetworkConnectionSection>,
    pub customization_updates: Vec<GuestCustomizationSection>,
    pub power_actions: Vec<PowerAction>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            reject_login: false,
            connects_allowed: None,
            vm_count: 1,
            storage_profiles: vec!["gold".into(), "silver".into()],
            vm_statuses: VecDeque::from([STATUS_POWERED_OFF]),
            vapp: None,
            internal_ip: Some("10.0.0.5".into()),
            external_ip: None,
            vapp_read_status: None,
            failing_ops: HashSet::new(),
            failing_tasks: HashSet::new(),
            next_task: 0,
            composed: Vec::new(),
            spec_updates: Vec::new(),
            network_updates: Vec::new(),
            customization_updates: Vec::new(),
            power_actions: Vec::new(),
        }
    }
}

impl State {
    pub fn called(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| *c == name).count()
    }

    fn task(&mut self, op: &'static str) -> Task {
        self.next_task += 1;
        let href = format!("{BASE}/task/{}", self.next_task);
        if self.failing_ops.contains(op) {
            self.failing_tasks.insert(href.clone());
        }
        Task {
            href,
            operation: Some(op.to_string()),
            status: TaskStatus::Running,
            error: None,
        }
    }

    fn vapp_view(&self, vapp: &FakeVApp) -> VApp {
        VApp {
            name: vapp.name.clone(),
            href: VAPP_HREF.to_string(),
            status: vapp.status,
            vms: (0..vapp.vm_count).map(|i| self.vm_view(i, vapp.status)).collect(),
            tasks: Vec::new(),
        }
    }

    fn vm_view(&self, index: usize, status: i32) -> Vm {
        let mut section = self
            .network_updates
            .last()
            .cloned()
            .unwrap_or_else(template_adapter);
        if let Some(first) = section.network_connection.first_mut() {
            first.ip_address = self.internal_ip.clone();
            first.external_ip_address = self.external_ip.clone();
        }
        Vm {
            name: format!("vm-{index}"),
            href: vm_href(index),
            status,
            description: None,
            vm_spec_section: Some(VmSpecSection {
                num_cpus: Some(1),
                num_cores_per_socket: Some(1),
                ..Default::default()
            }),
            network_connection_section: Some(section),
            guest_customization_section: Some(GuestCustomizationSection {
                enabled: Some(false),
                computer_name: Some("template".into()),
                ..Default::default()
            }),
        }
    }
}

pub fn vm_href(index: usize) -> String {
    format!("{BASE}/vApp/vm-{index}")
}

fn template_adapter() -> NetworkConnectionSection {
    NetworkConnectionSection {
        primary_network_connection_index: Some(0),
        network_connection: vec![NetworkConnection {
            network: "none".into(),
            network_connection_index: 0,
            ip_address_allocation_mode: "NONE".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Seed an existing vApp as if an earlier `create` had run.
    pub fn with_vapp(self, name: &str, status: i32) -> Self {
        self.state().vapp = Some(FakeVApp {
            name: name.to_string(),
            status,
            vm_count: 1,
        });
        self
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for FakeCloud {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>> {
        let mut state = self.state();
        state.calls.push("connect".into());
        if state.reject_login {
            return Err(Error::Authentication {
                org: credentials.org.clone(),
                reason: "http 401: invalid credentials".into(),
            });
        }
        if let Some(left) = state.connects_allowed.as_mut() {
            if *left == 0 {
                return Err(Error::Authentication {
                    org: credentials.org.clone(),
                    reason: "connection refused".into(),
                });
            }
            *left -= 1;
        }
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct FakeSession {
    state: Arc<Mutex<State>>,
}

impl FakeSession {
    fn enter(&self, call: &str) -> MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        state
    }
}

fn expect_name(kind: ResourceKind, want: &str, got: &str) -> Result<()> {
    if want == got {
        Ok(())
    } else {
        Err(Error::not_found(kind, got))
    }
}

fn gone(href: &str) -> Error {
    Error::Api {
        status: 404,
        message: format!("no such entity: {href}"),
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn find_org(&self, name: &str) -> Result<Org> {
        drop(self.enter("find_org"));
        expect_name(ResourceKind::Org, ORG, name)?;
        Ok(Org {
            name: ORG.into(),
            href: format!("{BASE}/org/1"),
            ..Default::default()
        })
    }

    async fn find_vdc(&self, _org: &Org, name: &str) -> Result<Vdc> {
        let state = self.enter("find_vdc");
        expect_name(ResourceKind::Vdc, VDC, name)?;
        Ok(Vdc {
            name: VDC.into(),
            href: format!("{BASE}/vdc/1"),
            storage_profiles: state
                .storage_profiles
                .iter()
                .map(|p| Reference::new(p.as_str(), format!("{BASE}/vdcStorageProfile/{p}")))
                .collect(),
            networks: vec![Reference::new(NETWORK, format!("{BASE}/network/1"))],
            vapps: Vec::new(),
        })
    }

    async fn find_network(&self, _vdc: &Vdc, name: &str) -> Result<Reference> {
        drop(self.enter("find_network"));
        expect_name(ResourceKind::Network, NETWORK, name)?;
        Ok(Reference::new(NETWORK, format!("{BASE}/network/1")))
    }

    async fn find_catalog(&self, _org: &Org, name: &str) -> Result<Catalog> {
        drop(self.enter("find_catalog"));
        expect_name(ResourceKind::Catalog, CATALOG, name)?;
        Ok(Catalog {
            name: CATALOG.into(),
            href: format!("{BASE}/catalog/1"),
            items: vec![Reference::new(TEMPLATE, format!("{BASE}/catalogItem/1"))],
        })
    }

    async fn find_catalog_item(&self, _catalog: &Catalog, name: &str) -> Result<CatalogItem> {
        drop(self.enter("find_catalog_item"));
        expect_name(ResourceKind::CatalogItem, TEMPLATE, name)?;
        Ok(CatalogItem {
            name: TEMPLATE.into(),
            href: format!("{BASE}/catalogItem/1"),
            entity: Reference::new(TEMPLATE, format!("{BASE}/vAppTemplate/vappTemplate-1")),
        })
    }

    async fn vapp_template(&self, item: &CatalogItem) -> Result<Reference> {
        drop(self.enter("vapp_template"));
        Ok(item.entity.clone())
    }

    async fn compose_vapp(&self, _vdc: &Vdc, request: &ComposeRequest) -> Result<Task> {
        let mut state = self.enter("compose_vapp");
        state.composed.push(request.clone());
        state.vapp = Some(FakeVApp {
            name: request.name.clone(),
            status: STATUS_POWERED_OFF,
            vm_count: state.vm_count,
        });
        Ok(state.task("compose_vapp"))
    }

    async fn find_vapp(&self, _vdc: &Vdc, name: &str) -> Result<VApp> {
        let state = self.enter("find_vapp");
        match &state.vapp {
            Some(vapp) if vapp.name == name => Ok(state.vapp_view(vapp)),
            _ => Err(Error::not_found(ResourceKind::VApp, name)),
        }
    }

    async fn get_vapp(&self, href: &str) -> Result<VApp> {
        let state = self.enter("get_vapp");
        if let Some(status) = state.vapp_read_status {
            return Err(Error::Api {
                status,
                message: "service unavailable".into(),
            });
        }
        match &state.vapp {
            Some(vapp) if href == VAPP_HREF => Ok(state.vapp_view(vapp)),
            _ => Err(gone(href)),
        }
    }

    async fn get_vm(&self, href: &str) -> Result<Vm> {
        let mut state = self.enter("get_vm");
        let Some(vapp) = state.vapp.clone() else {
            return Err(gone(href));
        };
        let Some(index) = (0..vapp.vm_count).find(|i| vm_href(*i) == href) else {
            return Err(gone(href));
        };
        let status = if state.vm_statuses.len() > 1 {
            state.vm_statuses.pop_front().unwrap_or(STATUS_POWERED_OFF)
        } else {
            state.vm_statuses.front().copied().unwrap_or(STATUS_POWERED_OFF)
        };
        Ok(state.vm_view(index, status))
    }

    async fn update_vm_spec(
        &self,
        _vm: &Vm,
        spec: &VmSpecSection,
        _description: &str,
    ) -> Result<Task> {
        let mut state = self.enter("update_vm_spec");
        state.spec_updates.push(spec.clone());
        Ok(state.task("update_vm_spec"))
    }

    async fn update_network_connections(
        &self,
        _vm: &Vm,
        section: &NetworkConnectionSection,
    ) -> Result<Task> {
        let mut state = self.enter("update_network_connections");
        state.network_updates.push(section.clone());
        Ok(state.task("update_network_connections"))
    }

    async fn update_guest_customization(
        &self,
        _vm: &Vm,
        section: &GuestCustomizationSection,
    ) -> Result<Task> {
        let mut state = self.enter("update_guest_customization");
        state.customization_updates.push(section.clone());
        Ok(state.task("update_guest_customization"))
    }

    async fn power(&self, vapp: &VApp, action: PowerAction) -> Result<Task> {
        let mut state = self.enter("power");
        if state.vapp.is_none() {
            return Err(gone(&vapp.href));
        }
        state.power_actions.push(action);
        let status = match action {
            PowerAction::PowerOn | PowerAction::Reboot => STATUS_POWERED_ON,
            PowerAction::Shutdown | PowerAction::PowerOff | PowerAction::Undeploy => {
                STATUS_POWERED_OFF
            }
        };
        if let Some(current) = state.vapp.as_mut() {
            current.status = status;
        }
        Ok(state.task("power"))
    }

    async fn delete_vapp(&self, vapp: &VApp) -> Result<Task> {
        let mut state = self.enter("delete_vapp");
        if state.vapp.take().is_none() {
            return Err(gone(&vapp.href));
        }
        Ok(state.task("delete_vapp"))
    }

    async fn refresh_task(&self, task: &Task) -> Result<Task> {
        let state = self.enter("refresh_task");
        let failed = state.failing_tasks.contains(&task.href);
        Ok(Task {
            status: if failed {
                TaskStatus::Error
            } else {
                TaskStatus::Success
            },
            error: failed.then(|| ApiError {
                message: "simulated task failure".into(),
                ..Default::default()
            }),
            ..task.clone()
        })
    }

    async fn disconnect(&self) -> Result<()> {
        drop(self.enter("disconnect"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Driver helpers
// ---------------------------------------------------------------------------

/// A complete configuration matching the fake's resource names.
pub fn config() -> DriverConfig {
    DriverConfig {
        url: BASE.into(),
        org: ORG.into(),
        vdc: VDC.into(),
        user: "admin".into(),
        password: "secret".into(),
        org_vdc_network: NETWORK.into(),
        ..DriverConfig::default()
    }
}

/// Millisecond polling so tests never sit in a real sleep.
pub fn fast_timings() -> Timings {
    Timings {
        power_poll_interval: Duration::from_millis(1),
        deploy_timeout: Duration::from_secs(5),
        task: TaskWait {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        },
    }
}

/// Pre-seed a key pair in `dir` so `create` never shells out to `ssh-keygen`.
pub fn write_key_pair(dir: &Path) -> PathBuf {
    let private = dir.join("id_rsa");
    std::fs::write(&private, "-----BEGIN FAKE KEY-----\n").unwrap();
    std::fs::write(dir.join("id_rsa.pub"), format!("{PUBLIC_KEY}\n")).unwrap();
    private
}

pub fn driver(cloud: &FakeCloud, dir: &Path, name: &str, config: DriverConfig) -> Driver {
    Driver::new(name, config, write_key_pair(dir), cloud.connector()).with_timings(fast_timings())
}
