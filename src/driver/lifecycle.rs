//! Power transitions and removal.
//!
//! Each call opens its own session, resolves the vApp through the stored
//! locator (or by name), submits one task and waits for it. No-op
//! transitions are left to the control plane to accept or reject.

use std::sync::Arc;

use tracing::{info, warn};

use super::{Driver, close};
use crate::error::Result;
use crate::vcd::Session;
use crate::vcd::types::{POWERED_OFF, PowerAction};

impl Driver {
    pub async fn start(&mut self) -> Result<()> {
        self.power_transition(PowerAction::PowerOn).await
    }

    /// Graceful guest shutdown.
    pub async fn stop(&mut self) -> Result<()> {
        self.power_transition(PowerAction::Shutdown).await
    }

    /// Hard power off.
    pub async fn kill(&mut self) -> Result<()> {
        self.power_transition(PowerAction::PowerOff).await
    }

    pub async fn restart(&mut self) -> Result<()> {
        self.power_transition(PowerAction::Reboot).await
    }

    async fn power_transition(&mut self, action: PowerAction) -> Result<()> {
        let session = self.open_session().await?;
        let result = self.submit_power(session.as_ref(), action).await;
        close(session, result).await
    }

    async fn submit_power(&mut self, session: &dyn Session, action: PowerAction) -> Result<()> {
        let vapp = self.resolve_vapp(session).await?;
        info!(vapp = %vapp.name, action = action.describe(), "Submitting power action");
        let task = session.power(&vapp, action).await?;
        self.wait(session, task, action.describe()).await
    }

    /// Power off (if needed) and delete the machine's vApp.
    ///
    /// When the lookup reports the vApp missing and `delete_when_failed` is
    /// set, a reachable control plane means the vApp is already gone and the
    /// call succeeds. Any other lookup error is returned as is.
    pub async fn remove(&mut self) -> Result<()> {
        let session = self.open_session().await?;
        let result = self.remove_vapp(&session).await;
        close(session, result).await
    }

    async fn remove_vapp(&mut self, session: &Arc<dyn Session>) -> Result<()> {
        let s = session.as_ref();
        let vapp = match self.resolve_vapp(s).await {
            Ok(vapp) => vapp,
            Err(err) => {
                if err.is_not_found()
                    && self.config.delete_when_failed
                    && self.seems_alive().await
                {
                    warn!(
                        vapp = %self.vapp_name,
                        error = %err,
                        "vApp not found but vCloud is reachable, treating it as already removed"
                    );
                    self.handle.clear();
                    return Ok(());
                }
                return Err(err);
            }
        };

        if vapp.status_label() != POWERED_OFF {
            info!(vapp = %vapp.name, status = vapp.status_label(), "Powering off before removal");
            let task = s.power(&vapp, PowerAction::Undeploy).await?;
            self.wait(s, task, PowerAction::Undeploy.describe()).await?;
        }

        info!(vapp = %vapp.name, "Deleting vApp");
        let task = s.delete_vapp(&vapp).await?;
        self.wait(s, task, "delete vapp").await?;

        self.handle.clear();
        Ok(())
    }

    /// Whether a fresh session can reach the configured org, datacenter and
    /// network.
    pub async fn seems_alive(&self) -> bool {
        let session = match self.open_session().await {
            Ok(session) => session,
            Err(_) => return false,
        };
        let result = self.probe(session.as_ref()).await;
        close(session, result).await.is_ok()
    }

    async fn probe(&self, session: &dyn Session) -> Result<()> {
        let vdc = self.locate_vdc(session).await?;
        session.find_network(&vdc, &self.config.org_vdc_network).await?;
        Ok(())
    }
}
