//! reqwest implementation of the control-plane seam.
//!
//! Talks to the vCloud Director REST API using its JSON representations
//! (`Accept: application/*+json;version=36.3`). One `reqwest::Client` is
//! built per session; nothing is pooled across driver calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::api::{Connector, Credentials, Session};
use super::types::{
    ApiError, Catalog, CatalogItem, ComposeRequest, GuestCustomizationSection,
    NetworkConnectionSection, Org, OrgList, PowerAction, Reference, Task, VApp, Vdc, Vm,
    VmSpecSection,
};
use crate::error::{Error, ResourceKind, Result};

const API_VERSION: &str = "36.3";
const AUTH_HEADER: &str = "x-vcloud-authorization";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(120);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

const COMPOSE_PARAMS: &str = "application/vnd.vmware.vcloud.composeVAppParams+json";
const VM_TYPE: &str = "application/vnd.vmware.vcloud.vm+json";
const NETWORK_CONNECTION_SECTION: &str =
    "application/vnd.vmware.vcloud.networkConnectionSection+json";
const GUEST_CUSTOMIZATION_SECTION: &str =
    "application/vnd.vmware.vcloud.guestCustomizationSection+json";
const UNDEPLOY_PARAMS: &str = "application/vnd.vmware.vcloud.undeployVAppParams+json";

fn accept_header() -> String {
    format!("application/*+json;version={API_VERSION}")
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens sessions against a real vCloud Director endpoint.
#[derive(Debug, Default, Clone)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>> {
        let auth_err = |reason: String| Error::Authentication {
            org: credentials.org.clone(),
            reason,
        };

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(credentials.insecure)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base = credentials.url.as_str().trim_end_matches('/').to_string();
        let login = format!("{base}/sessions");
        debug!(url = %login, user = %credentials.user, "authenticating");

        let resp = http
            .post(&login)
            .basic_auth(
                format!("{}@{}", credentials.user, credentials.org),
                Some(&credentials.password),
            )
            .header(ACCEPT, accept_header())
            .send()
            .await
            .map_err(|e| auth_err(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(auth_err(format!("http {}: {}", status.as_u16(), error_message(&body))));
        }

        let token = resp
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| auth_err(format!("response carried no {AUTH_HEADER} header")))?;

        Ok(Box::new(HttpSession { http, base, token }))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct HttpSession {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl HttpSession {
    fn request(&self, method: Method, href: &str) -> RequestBuilder {
        debug!(%method, href, "vcd request");
        self.http
            .request(method, href)
            .header(ACCEPT, accept_header())
            .header(AUTH_HEADER, &self.token)
    }

    async fn get<T: DeserializeOwned>(&self, href: &str) -> Result<T> {
        let resp = check(self.request(Method::GET, href).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        href: &str,
        content_type: &str,
        body: &B,
    ) -> Result<Response> {
        let body = serde_json::to_vec(body)?;
        let resp = self
            .request(method, href)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        check(resp).await
    }

    async fn task_from(&self, resp: Response) -> Result<Task> {
        Ok(resp.json().await?)
    }
}

/// Turn a non-2xx response into [`Error::Api`].
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) if !err.message.is_empty() => err.message,
        _ => body.trim().to_string(),
    }
}

/// Path segment under `/power/action/`; undeploy has its own endpoint.
fn power_verb(action: PowerAction) -> Option<&'static str> {
    match action {
        PowerAction::PowerOn => Some("powerOn"),
        PowerAction::Shutdown => Some("shutdown"),
        PowerAction::PowerOff => Some("powerOff"),
        PowerAction::Reboot => Some("reboot"),
        PowerAction::Undeploy => None,
    }
}

fn by_name<'a>(refs: &'a [Reference], name: &str) -> Option<&'a Reference> {
    refs.iter().find(|r| r.name == name)
}

/// The `composeVApp` body: one sourced template bridged onto one network.
fn compose_body(request: &ComposeRequest) -> serde_json::Value {
    json!({
        "name": request.name,
        "description": request.description,
        "deploy": false,
        "powerOn": false,
        "allEULAsAccepted": true,
        "instantiationParams": {
            "section": [{
                "_type": "NetworkConfigSectionType",
                "info": {"value": "Configuration parameters for logical networks"},
                "networkConfig": [{
                    "networkName": request.network.name,
                    "configuration": {
                        "parentNetwork": {"href": request.network.href},
                        "fenceMode": "bridged"
                    }
                }]
            }]
        },
        "sourcedItem": [{
            "source": {"href": request.template.href},
            "storageProfile": {
                "href": request.storage_profile.href,
                "name": request.storage_profile.name
            }
        }]
    })
}

#[async_trait]
impl Session for HttpSession {
    async fn find_org(&self, name: &str) -> Result<Org> {
        let orgs: OrgList = self.get(&format!("{}/org", self.base)).await?;
        let org = by_name(&orgs.org, name).ok_or_else(|| Error::not_found(ResourceKind::Org, name))?;
        self.get(&org.href).await
    }

    async fn find_vdc(&self, org: &Org, name: &str) -> Result<Vdc> {
        let link = org
            .links_of("vdc")
            .find(|l| l.name.as_deref() == Some(name))
            .ok_or_else(|| Error::not_found(ResourceKind::Vdc, name))?;
        self.get(&link.href).await
    }

    async fn find_network(&self, vdc: &Vdc, name: &str) -> Result<Reference> {
        by_name(&vdc.networks, name)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Network, name))
    }

    async fn find_catalog(&self, org: &Org, name: &str) -> Result<Catalog> {
        let link = org
            .links_of("catalog")
            .find(|l| l.name.as_deref() == Some(name))
            .ok_or_else(|| Error::not_found(ResourceKind::Catalog, name))?;
        self.get(&link.href).await
    }

    async fn find_catalog_item(&self, catalog: &Catalog, name: &str) -> Result<CatalogItem> {
        let item = by_name(&catalog.items, name)
            .ok_or_else(|| Error::not_found(ResourceKind::CatalogItem, name))?;
        self.get(&item.href).await
    }

    async fn vapp_template(&self, item: &CatalogItem) -> Result<Reference> {
        let entity = &item.entity;
        if entity.media_type.is_some() && !entity.is_kind("vAppTemplate") {
            return Err(Error::not_found(ResourceKind::Template, &item.name));
        }
        Ok(entity.clone())
    }

    async fn compose_vapp(&self, vdc: &Vdc, request: &ComposeRequest) -> Result<Task> {
        let href = format!("{}/action/composeVApp", vdc.href);
        let resp = self
            .send_json(Method::POST, &href, COMPOSE_PARAMS, &compose_body(request))
            .await?;
        let vapp: VApp = resp.json().await?;
        vapp.tasks.into_iter().next().ok_or_else(|| Error::TaskFailed {
            operation: "compose vapp".into(),
            message: "server returned no task".into(),
        })
    }

    async fn find_vapp(&self, vdc: &Vdc, name: &str) -> Result<VApp> {
        let current: Vdc = self.get(&vdc.href).await?;
        let vapp =
            by_name(&current.vapps, name).ok_or_else(|| Error::not_found(ResourceKind::VApp, name))?;
        self.get(&vapp.href).await
    }

    async fn get_vapp(&self, href: &str) -> Result<VApp> {
        self.get(href).await
    }

    async fn get_vm(&self, href: &str) -> Result<Vm> {
        self.get(href).await
    }

    async fn update_vm_spec(
        &self,
        vm: &Vm,
        spec: &VmSpecSection,
        description: &str,
    ) -> Result<Task> {
        let href = format!("{}/action/reconfigureVm", vm.href);
        let body = json!({
            "name": vm.name,
            "description": description,
            "vmSpecSection": spec,
        });
        let resp = self.send_json(Method::POST, &href, VM_TYPE, &body).await?;
        self.task_from(resp).await
    }

    async fn update_network_connections(
        &self,
        vm: &Vm,
        section: &NetworkConnectionSection,
    ) -> Result<Task> {
        let href = format!("{}/networkConnectionSection/", vm.href);
        let resp = self
            .send_json(Method::PUT, &href, NETWORK_CONNECTION_SECTION, section)
            .await?;
        self.task_from(resp).await
    }

    async fn update_guest_customization(
        &self,
        vm: &Vm,
        section: &GuestCustomizationSection,
    ) -> Result<Task> {
        let href = format!("{}/guestCustomizationSection/", vm.href);
        let resp = self
            .send_json(Method::PUT, &href, GUEST_CUSTOMIZATION_SECTION, section)
            .await?;
        self.task_from(resp).await
    }

    async fn power(&self, vapp: &VApp, action: PowerAction) -> Result<Task> {
        let resp = match power_verb(action) {
            Some(verb) => {
                let href = format!("{}/power/action/{verb}", vapp.href);
                check(self.request(Method::POST, &href).send().await?).await?
            }
            None => {
                let href = format!("{}/action/undeploy", vapp.href);
                let body = json!({"undeployPowerAction": "powerOff"});
                self.send_json(Method::POST, &href, UNDEPLOY_PARAMS, &body).await?
            }
        };
        self.task_from(resp).await
    }

    async fn delete_vapp(&self, vapp: &VApp) -> Result<Task> {
        let resp = check(self.request(Method::DELETE, &vapp.href).send().await?).await?;
        self.task_from(resp).await
    }

    async fn refresh_task(&self, task: &Task) -> Result<Task> {
        self.get(&task.href).await
    }

    async fn disconnect(&self) -> Result<()> {
        let href = format!("{}/session", self.base);
        check(self.request(Method::DELETE, &href).send().await?).await?;
        Ok(())
    }
}
