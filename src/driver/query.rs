//! State and address queries.

use std::net::IpAddr;

use tracing::warn;

use super::{Driver, MachineState, close};
use crate::error::{Error, Result};
use crate::vcd::types::{MIXED, NetworkConnection, POWERED_OFF, POWERED_ON, UNRESOLVED};

impl Driver {
    /// Map the vApp's power status to a [`MachineState`].
    pub async fn get_state(&mut self) -> Result<MachineState> {
        let session = self.open_session().await?;
        let result = self.resolve_vapp(session.as_ref()).await;
        let vapp = close(session, result).await?;
        Ok(map_status(vapp.status_label()))
    }

    /// First external address across the VM's adapters, else the first
    /// internal one.
    pub async fn get_ip(&mut self) -> Result<String> {
        let session = self.open_session().await?;
        let result = self.resolve_vm(session.as_ref()).await;
        let vm = close(session, result).await?;
        select_address(vm.network_connections())
            .map(str::to_string)
            .ok_or(Error::AddressUnavailable)
    }

    pub async fn get_ssh_hostname(&mut self) -> Result<String> {
        self.get_ip().await
    }

    /// `tcp://<ip>:<docker-port>`; the machine must be running.
    pub async fn get_url(&mut self) -> Result<String> {
        let state = self.get_state().await?;
        if state != MachineState::Running {
            return Err(Error::NotRunning {
                state: format!("{state:?}"),
            });
        }
        let ip = self.get_ip().await?;
        Ok(docker_url(&ip, self.config.docker_port))
    }
}

pub fn map_status(status: &str) -> MachineState {
    match status {
        POWERED_ON => MachineState::Running,
        POWERED_OFF => MachineState::Stopped,
        MIXED | UNRESOLVED => MachineState::Error,
        other => {
            warn!(status = other, "unrecognised vApp status");
            MachineState::None
        }
    }
}

pub fn select_address(connections: &[NetworkConnection]) -> Option<&str> {
    connections
        .iter()
        .find_map(|c| non_empty(&c.external_ip_address))
        .or_else(|| connections.iter().find_map(|c| non_empty(&c.ip_address)))
}

fn non_empty(address: &Option<String>) -> Option<&str> {
    address.as_deref().filter(|a| !a.is_empty())
}

/// Join host and port, bracketing IPv6 literals.
pub fn docker_url(ip: &str, port: u16) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("tcp://[{ip}]:{port}"),
        _ => format!("tcp://{ip}:{port}"),
    }
}
