//! The provisioning workflow behind `create`.
//!
//! Every step depends on the previous one; the first failure aborts the run
//! and nothing is rolled back. Locators are recorded only after the final
//! power-on succeeds, so a failed run leaves the handle empty and a later
//! `remove` falls back to lookup by name.

use std::sync::Arc;

use tracing::info;

use super::customization::{customization_script, ensure_ssh_key, guest_section};
use super::monitor::wait_for_vm_status;
use super::{Driver, VmHandle, close};
use crate::config::DriverConfig;
use crate::error::{Error, ResourceKind, Result};
use crate::vcd::Session;
use crate::vcd::types::{
    ComposeRequest, MemoryResourceMb, NetworkConnection, NetworkConnectionSection, POWERED_OFF,
    PowerAction, Reference, VApp, Vdc, Vm, VmSpecSection,
};

pub const POOL_ALLOCATION: &str = "POOL";

impl Driver {
    /// Compose, configure and boot the machine's VM.
    pub async fn create(&mut self) -> Result<()> {
        self.config.validate()?;
        let public_key = ensure_ssh_key(&self.ssh_key_path).await?;

        let session = self.open_session().await?;
        let result = self.provision(&session, &public_key).await;
        close(session, result).await
    }

    async fn provision(&mut self, session: &Arc<dyn Session>, public_key: &str) -> Result<()> {
        let s = session.as_ref();
        let cfg = &self.config;

        // ------------------------------------------------------------------
        // Resolve named resources
        // ------------------------------------------------------------------
        let org = s.find_org(&cfg.org).await?;
        let vdc = s.find_vdc(&org, &cfg.vdc).await?;

        info!(network = %cfg.org_vdc_network, "Finding network...");
        let network = s.find_network(&vdc, &cfg.org_vdc_network).await?;

        info!(catalog = %cfg.catalog, "Finding catalog...");
        let catalog = s.find_catalog(&org, &cfg.catalog).await?;

        info!(template = %cfg.template, "Finding template...");
        let item = s.find_catalog_item(&catalog, &cfg.template).await?;
        let template = s.vapp_template(&item).await?;

        let storage_profile = select_storage_profile(&vdc, &cfg.storage_profile)?;

        // ------------------------------------------------------------------
        // Compose
        // ------------------------------------------------------------------
        info!(vapp = %self.vapp_name, storage_profile = %storage_profile.name, "Creating a new vApp...");
        let request = ComposeRequest {
            name: self.vapp_name.clone(),
            description: cfg.description.clone(),
            template,
            network: network.clone(),
            storage_profile,
        };
        let task = s.compose_vapp(&vdc, &request).await?;
        self.wait(s, task, "compose vapp").await?;

        let vapp = s.find_vapp(&vdc, &self.vapp_name).await?;
        let child = single_vm(&vapp)?;

        info!(vm = %child.name, "Waiting for the VM to be powered off...");
        wait_for_vm_status(
            Arc::clone(session),
            child.href.clone(),
            POWERED_OFF,
            self.timings.power_poll_interval,
            self.timings.deploy_timeout,
        )
        .await?;

        // ------------------------------------------------------------------
        // Configure
        // ------------------------------------------------------------------
        let vm = s.get_vm(&child.href).await?;
        info!(
            cpus = cfg.num_cpus,
            cores_per_socket = cfg.cores_per_socket,
            memory_mb = cfg.memory_mb,
            "Updating virtual hardware specs..."
        );
        let spec = sized_spec(vm.vm_spec_section.clone().unwrap_or_default(), cfg);
        let task = s.update_vm_spec(&vm, &spec, &cfg.description).await?;
        self.wait(s, task, "update vm spec").await?;

        let vm = s.get_vm(&vm.href).await?;
        info!(network = %network.name, "Configuring network connection...");
        let section = attach_network(
            vm.network_connection_section.clone().unwrap_or_default(),
            &network.name,
        );
        let task = s.update_network_connections(&vm, &section).await?;
        self.wait(s, task, "update network connection").await?;

        info!("Setting up guest customization...");
        let section = guest_section(
            vm.guest_customization_section.clone().unwrap_or_default(),
            customization_script(public_key),
        );
        let task = s.update_guest_customization(&vm, &section).await?;
        self.wait(s, task, "update guest customization").await?;

        // ------------------------------------------------------------------
        // Boot
        // ------------------------------------------------------------------
        info!(machine = %self.machine_name, "Booting up...");
        let task = s.power(&vapp, PowerAction::PowerOn).await?;
        self.wait(s, task, PowerAction::PowerOn.describe()).await?;

        self.handle = VmHandle {
            vapp_href: Some(vapp.href.clone()),
            vm_href: Some(vm.href.clone()),
        };
        Ok(())
    }
}

/// The named profile, or the datacenter's first profile when `name` is empty.
pub fn select_storage_profile(vdc: &Vdc, name: &str) -> Result<Reference> {
    if name.is_empty() {
        return vdc
            .storage_profiles
            .first()
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::StorageProfile, "<datacenter default>"));
    }
    vdc.storage_profiles
        .iter()
        .find(|p| p.name == name)
        .cloned()
        .ok_or_else(|| Error::not_found(ResourceKind::StorageProfile, name))
}

/// The vApp's only VM. Any other count means the template is not a
/// single-VM template.
pub fn single_vm(vapp: &VApp) -> Result<&Vm> {
    match vapp.vms.as_slice() {
        [vm] => Ok(vm),
        vms => Err(Error::Composition { count: vms.len() }),
    }
}

/// Apply the configured CPU, cores-per-socket and memory to `spec`.
pub fn sized_spec(spec: VmSpecSection, cfg: &DriverConfig) -> VmSpecSection {
    let memory = MemoryResourceMb {
        configured: i64::from(cfg.memory_mb),
        ..spec.memory_resource_mb.clone().unwrap_or_default()
    };
    VmSpecSection {
        num_cpus: Some(cfg.num_cpus),
        num_cores_per_socket: Some(cfg.cores_per_socket),
        memory_resource_mb: Some(memory),
        modified: Some(true),
        ..spec
    }
}

/// Point the template's adapter at `network` with a pool-allocated address
/// and customization on boot.
///
/// The adapter is the one at the primary index, else the first one; a VM
/// without adapters gets a new one at index 0.
pub fn attach_network(
    mut section: NetworkConnectionSection,
    network: &str,
) -> NetworkConnectionSection {
    let primary = section.primary_network_connection_index.and_then(|index| {
        section
            .network_connection
            .iter()
            .position(|c| c.network_connection_index == index)
    });
    let position = match primary {
        Some(p) => p,
        None if !section.network_connection.is_empty() => 0,
        None => {
            section.network_connection.push(NetworkConnection::default());
            0
        }
    };

    let connection = &mut section.network_connection[position];
    connection.network = network.to_string();
    connection.ip_address_allocation_mode = POOL_ALLOCATION.to_string();
    connection.is_connected = true;
    connection.needs_customization = true;
    section.primary_network_connection_index = Some(connection.network_connection_index);
    section
}
