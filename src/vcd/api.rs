//! The control-plane seam: opening sessions and the calls made through them.
//!
//! [`Connector`] opens one authenticated [`Session`] per driver call. The
//! HTTP implementation lives in [`super::client`]; tests substitute an
//! in-memory fake.

use async_trait::async_trait;

use super::types::{
    Catalog, CatalogItem, ComposeRequest, GuestCustomizationSection, NetworkConnectionSection,
    Org, PowerAction, Reference, Task, VApp, Vdc, Vm, VmSpecSection,
};
use crate::error::Result;

/// Login material for one tenant.
#[derive(Clone)]
pub struct Credentials {
    pub url: url::Url,
    pub org: String,
    pub user: String,
    pub password: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url.as_str())
            .field("org", &self.org)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .finish()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Authenticate and return a fresh session. Fails with
    /// [`crate::error::Error::Authentication`] on bad credentials or an
    /// unreachable endpoint.
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>>;
}

/// An authenticated session. Lookups match names exactly and fail with
/// [`crate::error::Error::NotFound`] when nothing matches.
#[async_trait]
pub trait Session: Send + Sync {
    async fn find_org(&self, name: &str) -> Result<Org>;
    async fn find_vdc(&self, org: &Org, name: &str) -> Result<Vdc>;
    async fn find_network(&self, vdc: &Vdc, name: &str) -> Result<Reference>;
    async fn find_catalog(&self, org: &Org, name: &str) -> Result<Catalog>;
    async fn find_catalog_item(&self, catalog: &Catalog, name: &str) -> Result<CatalogItem>;
    /// Resolve a catalog item to the vApp template it publishes.
    async fn vapp_template(&self, item: &CatalogItem) -> Result<Reference>;

    async fn compose_vapp(&self, vdc: &Vdc, request: &ComposeRequest) -> Result<Task>;
    /// Look a vApp up by name, reading the datacenter's current contents.
    async fn find_vapp(&self, vdc: &Vdc, name: &str) -> Result<VApp>;
    async fn get_vapp(&self, href: &str) -> Result<VApp>;
    async fn get_vm(&self, href: &str) -> Result<Vm>;

    async fn update_vm_spec(&self, vm: &Vm, spec: &VmSpecSection, description: &str)
    -> Result<Task>;
    async fn update_network_connections(
        &self,
        vm: &Vm,
        section: &NetworkConnectionSection,
    ) -> Result<Task>;
    async fn update_guest_customization(
        &self,
        vm: &Vm,
        section: &GuestCustomizationSection,
    ) -> Result<Task>;
    async fn power(&self, vapp: &VApp, action: PowerAction) -> Result<Task>;
    async fn delete_vapp(&self, vapp: &VApp) -> Result<Task>;

    /// Re-read a task's current status.
    async fn refresh_task(&self, task: &Task) -> Result<Task>;

    /// End the session on the server.
    async fn disconnect(&self) -> Result<()>;
}
