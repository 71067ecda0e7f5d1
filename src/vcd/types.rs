//! Typed JSON representations of vCloud Director API objects.
//!
//! Only the fields the driver reads or writes are modelled. Sections that
//! are written back to the API keep every unknown field in a flattened
//! `extra` map so a read-modify-write cycle does not drop server data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Status labels
// ---------------------------------------------------------------------------

pub const POWERED_ON: &str = "POWERED_ON";
pub const POWERED_OFF: &str = "POWERED_OFF";
pub const MIXED: &str = "MIXED";
pub const UNRESOLVED: &str = "UNRESOLVED";

/// Map a numeric vApp/VM status code to its label.
pub fn status_label(code: i32) -> &'static str {
    match code {
        -1 => "FAILED_CREATION",
        0 => UNRESOLVED,
        1 => "RESOLVED",
        2 => "DEPLOYED",
        3 => "SUSPENDED",
        4 => POWERED_ON,
        5 => "WAITING_FOR_INPUT",
        6 => "UNKNOWN",
        7 => "UNRECOGNIZED",
        8 => POWERED_OFF,
        9 => "INCONSISTENT_STATE",
        10 => MIXED,
        _ => "UNKNOWN",
    }
}

/// Reduce a vCloud media type to its bare kind:
/// `application/vnd.vmware.vcloud.vdc+xml` becomes `vdc`.
pub fn media_kind(media_type: &str) -> &str {
    let kind = media_type
        .strip_prefix("application/vnd.vmware.vcloud.")
        .or_else(|| media_type.strip_prefix("application/vnd.vmware.admin."))
        .unwrap_or(media_type);
    kind.split('+').next().unwrap_or(kind)
}

// ---------------------------------------------------------------------------
// References and links
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub href: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Reference {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            name: name.into(),
            media_type: None,
            id: None,
        }
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.media_type.as_deref().map(media_kind) == Some(kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    pub href: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub media_type: Option<String>,
}

impl Link {
    pub fn is_kind(&self, kind: &str) -> bool {
        self.media_type.as_deref().map(media_kind) == Some(kind)
    }
}

// ---------------------------------------------------------------------------
// Org / VDC / Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrgList {
    #[serde(default)]
    pub org: Vec<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Org {
    pub name: String,
    pub href: String,
    #[serde(default)]
    pub link: Vec<Link>,
}

impl Org {
    /// Links of the given media kind, e.g. `vdc` or `catalog`.
    pub fn links_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.link.iter().filter(move |l| l.is_kind(kind))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageProfiles {
    #[serde(default)]
    vdc_storage_profile: Vec<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AvailableNetworks {
    #[serde(default)]
    network: Vec<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceEntities {
    #[serde(default)]
    resource_entity: Vec<Reference>,
}

/// A virtual datacenter with the references the driver looks up by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawVdc")]
pub struct Vdc {
    pub name: String,
    pub href: String,
    /// In server order; the first entry is the datacenter default.
    pub storage_profiles: Vec<Reference>,
    pub networks: Vec<Reference>,
    pub vapps: Vec<Reference>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVdc {
    name: String,
    href: String,
    #[serde(default)]
    vdc_storage_profiles: Option<StorageProfiles>,
    #[serde(default)]
    available_networks: Option<AvailableNetworks>,
    #[serde(default)]
    resource_entities: Option<ResourceEntities>,
}

impl From<RawVdc> for Vdc {
    fn from(raw: RawVdc) -> Self {
        Vdc {
            name: raw.name,
            href: raw.href,
            storage_profiles: raw
                .vdc_storage_profiles
                .map(|p| p.vdc_storage_profile)
                .unwrap_or_default(),
            networks: raw.available_networks.map(|n| n.network).unwrap_or_default(),
            vapps: raw
                .resource_entities
                .map(|r| r.resource_entity)
                .unwrap_or_default()
                .into_iter()
                .filter(|r| r.is_kind("vApp"))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogItems {
    #[serde(default)]
    catalog_item: Vec<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawCatalog")]
pub struct Catalog {
    pub name: String,
    pub href: String,
    pub items: Vec<Reference>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalog {
    name: String,
    href: String,
    #[serde(default)]
    catalog_items: Option<CatalogItems>,
}

impl From<RawCatalog> for Catalog {
    fn from(raw: RawCatalog) -> Self {
        Catalog {
            name: raw.name,
            href: raw.href,
            items: raw.catalog_items.map(|c| c.catalog_item).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    pub href: String,
    /// The deployable object behind the item, normally a vApp template.
    pub entity: Reference,
}

// ---------------------------------------------------------------------------
// vApp / VM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct VAppChildren {
    #[serde(default)]
    vm: Vec<Vm>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tasks {
    #[serde(default)]
    pub task: Vec<Task>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawVApp")]
pub struct VApp {
    pub name: String,
    pub href: String,
    pub status: i32,
    pub vms: Vec<Vm>,
    /// Tasks running against the vApp, present right after composition.
    pub tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct RawVApp {
    name: String,
    href: String,
    #[serde(default)]
    status: i32,
    #[serde(default)]
    children: Option<VAppChildren>,
    #[serde(default)]
    tasks: Option<Tasks>,
}

impl From<RawVApp> for VApp {
    fn from(raw: RawVApp) -> Self {
        VApp {
            name: raw.name,
            href: raw.href,
            status: raw.status,
            vms: raw.children.map(|c| c.vm).unwrap_or_default(),
            tasks: raw.tasks.map(|t| t.task).unwrap_or_default(),
        }
    }
}

impl VApp {
    pub fn status_label(&self) -> &'static str {
        status_label(self.status)
    }
}

/// A VM with the sections the driver reconfigures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "RawVm")]
pub struct Vm {
    pub name: String,
    pub href: String,
    pub status: i32,
    pub description: Option<String>,
    pub vm_spec_section: Option<VmSpecSection>,
    pub network_connection_section: Option<NetworkConnectionSection>,
    pub guest_customization_section: Option<GuestCustomizationSection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVm {
    name: String,
    href: String,
    #[serde(default)]
    status: i32,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    vm_spec_section: Option<VmSpecSection>,
    #[serde(default)]
    section: Vec<Value>,
}

/// Sections the driver rewrites must decode; sending back a default in
/// place of an unreadable one would wipe the template's settings.
impl TryFrom<RawVm> for Vm {
    type Error = serde_json::Error;

    fn try_from(raw: RawVm) -> Result<Self, Self::Error> {
        let mut vm = Vm {
            name: raw.name,
            href: raw.href,
            status: raw.status,
            description: raw.description,
            vm_spec_section: raw.vm_spec_section,
            network_connection_section: None,
            guest_customization_section: None,
        };
        for section in raw.section {
            match section.get("_type").and_then(Value::as_str) {
                Some("NetworkConnectionSectionType") => {
                    vm.network_connection_section = Some(serde_json::from_value(section)?);
                }
                Some("GuestCustomizationSectionType") => {
                    vm.guest_customization_section = Some(serde_json::from_value(section)?);
                }
                _ => {}
            }
        }
        Ok(vm)
    }
}

impl Vm {
    pub fn status_label(&self) -> &'static str {
        status_label(self.status)
    }

    pub fn network_connections(&self) -> &[NetworkConnection] {
        self.network_connection_section
            .as_ref()
            .map(|s| s.network_connection.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResourceMb {
    pub configured: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSpecSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cores_per_socket: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_resource_mb: Option<MemoryResourceMb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnection {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub network_connection_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip_address: Option<String>,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ip_address_allocation_mode: String,
    #[serde(default)]
    pub needs_customization: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConnectionSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_network_connection_index: Option<i32>,
    #[serde(default)]
    pub network_connection: Vec<NetworkConnection>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCustomizationSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Tasks and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Queued,
    PreRunning,
    #[default]
    Running,
    Success,
    Error,
    Canceled,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Error | TaskStatus::Canceled | TaskStatus::Aborted
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::PreRunning => "preRunning",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The error body vCloud returns for failed requests and failed tasks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub major_error_code: Option<i32>,
    #[serde(default)]
    pub minor_error_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub href: String,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<ApiError>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Everything needed to compose a single-template vApp.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub name: String,
    pub description: String,
    pub template: Reference,
    pub network: Reference,
    pub storage_profile: Reference,
}

/// Power transitions submitted against a vApp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    PowerOn,
    /// Graceful guest shutdown.
    Shutdown,
    /// Hard power off.
    PowerOff,
    Reboot,
    /// Undeploy with power off, required before deletion.
    Undeploy,
}

impl PowerAction {
    pub fn describe(self) -> &'static str {
        match self {
            PowerAction::PowerOn => "power on",
            PowerAction::Shutdown => "shutdown",
            PowerAction::PowerOff => "power off",
            PowerAction::Reboot => "reboot",
            PowerAction::Undeploy => "undeploy",
        }
    }
}
