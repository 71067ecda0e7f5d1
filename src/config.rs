//! Driver configuration: defaults, create flags, the TOML defaults file and
//! validation.
//!
//! Values are layered, highest wins: command-line flag, environment
//! variable, defaults file, built-in default. The merged [`DriverConfig`] is
//! validated before the driver touches the network.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vcd::Credentials;

pub const DEFAULT_CATALOG: &str = "Public";
pub const DEFAULT_TEMPLATE: &str = "Ubuntu_Server_20.04";
pub const DEFAULT_CPUS: u32 = 1;
pub const DEFAULT_CORES_PER_SOCKET: u32 = 1;
pub const DEFAULT_MEMORY_MB: u32 = 2048;
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_DOCKER_PORT: u16 = 2376;
pub const DEFAULT_DESCRIPTION: &str = "Created with Docker Machine";
pub const SSH_USER: &str = "root";

// ---------------------------------------------------------------------------
// DriverConfig
// ---------------------------------------------------------------------------

/// Immutable per-machine configuration. Built once before `create` and
/// persisted with the machine record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DriverConfig {
    pub url: String,
    pub org: String,
    pub vdc: String,
    pub insecure: bool,
    pub user: String,
    pub password: String,
    pub org_vdc_network: String,
    pub catalog: String,
    pub template: String,
    pub num_cpus: u32,
    pub cores_per_socket: u32,
    pub memory_mb: u32,
    /// Empty means the datacenter's default profile.
    pub storage_profile: String,
    pub description: String,
    pub docker_port: u16,
    pub ssh_port: u16,
    pub delete_when_failed: bool,
    pub name_prefix: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            org: String::new(),
            vdc: String::new(),
            insecure: false,
            user: String::new(),
            password: String::new(),
            org_vdc_network: String::new(),
            catalog: DEFAULT_CATALOG.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            num_cpus: DEFAULT_CPUS,
            cores_per_socket: DEFAULT_CORES_PER_SOCKET,
            memory_mb: DEFAULT_MEMORY_MB,
            storage_profile: String::new(),
            description: DEFAULT_DESCRIPTION.to_string(),
            docker_port: DEFAULT_DOCKER_PORT,
            ssh_port: DEFAULT_SSH_PORT,
            delete_when_failed: true,
            name_prefix: String::new(),
        }
    }
}

impl DriverConfig {
    /// Check every required option and the endpoint URL.
    ///
    /// All missing options are reported together.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("vcd-url", &self.url),
            ("vcd-org", &self.org),
            ("vcd-vdc", &self.vdc),
            ("vcd-user", &self.user),
            ("vcd-password", &self.password),
            ("vcd-orgvdcnetwork", &self.org_vdc_network),
            ("vcd-catalog", &self.catalog),
            ("vcd-template", &self.template),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(flag, _)| *flag)
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "missing mandatory parameters: --{}",
                missing.join(", --")
            )));
        }

        self.endpoint()?;

        for (flag, value) in [
            ("vcd-numcpus", self.num_cpus),
            ("vcd-corespersocket", self.cores_per_socket),
            ("vcd-memory-size-mb", self.memory_mb),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("--{flag} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Parse the endpoint as an absolute URL.
    pub fn endpoint(&self) -> Result<url::Url> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| Error::InvalidConfig(format!("unable to parse --vcd-url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::InvalidConfig(format!(
                "--vcd-url must be an absolute http(s) url, got {}",
                self.url
            )));
        }
        Ok(url)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            url: self.endpoint()?,
            org: self.org.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            insecure: self.insecure,
        })
    }
}

// ---------------------------------------------------------------------------
// Layering
// ---------------------------------------------------------------------------

/// One optional value per option. Used both for what the command line
/// supplied and for the contents of the defaults file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLayer {
    pub url: Option<String>,
    pub org: Option<String>,
    pub vdc: Option<String>,
    pub insecure: Option<bool>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub orgvdcnetwork: Option<String>,
    pub catalog: Option<String>,
    pub template: Option<String>,
    pub numcpus: Option<u32>,
    pub corespersocket: Option<u32>,
    pub memory_size_mb: Option<u32>,
    pub storageprofile: Option<String>,
    pub description: Option<String>,
    pub docker_port: Option<u16>,
    pub ssh_port: Option<u16>,
    pub delete_when_failed: Option<bool>,
    pub name_prefix: Option<String>,
}

impl ConfigLayer {
    /// Read a defaults file. A missing file yields an empty layer.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::store(path, e)),
        };
        toml::from_str(&content).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill every unset value of `self` from `lower`.
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            url: self.url.or(lower.url),
            org: self.org.or(lower.org),
            vdc: self.vdc.or(lower.vdc),
            insecure: self.insecure.or(lower.insecure),
            user: self.user.or(lower.user),
            password: self.password.or(lower.password),
            orgvdcnetwork: self.orgvdcnetwork.or(lower.orgvdcnetwork),
            catalog: self.catalog.or(lower.catalog),
            template: self.template.or(lower.template),
            numcpus: self.numcpus.or(lower.numcpus),
            corespersocket: self.corespersocket.or(lower.corespersocket),
            memory_size_mb: self.memory_size_mb.or(lower.memory_size_mb),
            storageprofile: self.storageprofile.or(lower.storageprofile),
            description: self.description.or(lower.description),
            docker_port: self.docker_port.or(lower.docker_port),
            ssh_port: self.ssh_port.or(lower.ssh_port),
            delete_when_failed: self.delete_when_failed.or(lower.delete_when_failed),
            name_prefix: self.name_prefix.or(lower.name_prefix),
        }
    }

    /// Resolve against the built-in defaults and validate.
    pub fn into_config(self) -> Result<DriverConfig> {
        let d = DriverConfig::default();
        let config = DriverConfig {
            url: self.url.unwrap_or(d.url),
            org: self.org.unwrap_or(d.org),
            vdc: self.vdc.unwrap_or(d.vdc),
            insecure: self.insecure.unwrap_or(d.insecure),
            user: self.user.unwrap_or(d.user),
            password: self.password.unwrap_or(d.password),
            org_vdc_network: self.orgvdcnetwork.unwrap_or(d.org_vdc_network),
            catalog: self.catalog.unwrap_or(d.catalog),
            template: self.template.unwrap_or(d.template),
            num_cpus: self.numcpus.unwrap_or(d.num_cpus),
            cores_per_socket: self.corespersocket.unwrap_or(d.cores_per_socket),
            memory_mb: self.memory_size_mb.unwrap_or(d.memory_mb),
            storage_profile: self.storageprofile.unwrap_or(d.storage_profile),
            description: self.description.unwrap_or(d.description),
            docker_port: self.docker_port.unwrap_or(d.docker_port),
            ssh_port: self.ssh_port.unwrap_or(d.ssh_port),
            delete_when_failed: self.delete_when_failed.unwrap_or(d.delete_when_failed),
            name_prefix: self.name_prefix.unwrap_or(d.name_prefix),
        };
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Create flags
// ---------------------------------------------------------------------------

/// One configuration option as presented to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFlag {
    pub name: &'static str,
    pub env: &'static str,
    pub usage: &'static str,
    pub default: Option<String>,
}

const fn flag(name: &'static str, env: &'static str, usage: &'static str) -> CreateFlag {
    CreateFlag {
        name,
        env,
        usage,
        default: None,
    }
}

/// Every option `create` accepts, in presentation order.
pub fn create_flags() -> Vec<CreateFlag> {
    let with = |f: CreateFlag, default: String| CreateFlag {
        default: Some(default),
        ..f
    };
    vec![
        flag("vcd-url", "VCD_URL", "vCloud Director URL"),
        flag("vcd-org", "VCD_ORG", "vCloud Director Org"),
        flag("vcd-vdc", "VCD_VDC", "vCloud Director Virtual Datacenter"),
        with(
            flag("vcd-insecure", "VCD_INSECURE", "vCloud Director Insecure Connection"),
            "false".into(),
        ),
        flag("vcd-user", "VCD_USERNAME", "vCloud Director username"),
        flag("vcd-password", "VCD_PASSWORD", "vCloud Director password"),
        flag("vcd-orgvdcnetwork", "VCD_ORGVDCNETWORK", "vCloud Director OrgVDC network"),
        with(
            flag("vcd-catalog", "VCD_CATALOG", "vCloud Director catalog"),
            DEFAULT_CATALOG.into(),
        ),
        with(
            flag("vcd-template", "VCD_TEMPLATE", "vCloud Director vApp template"),
            DEFAULT_TEMPLATE.into(),
        ),
        with(
            flag("vcd-numcpus", "VCD_NUMCPUS", "vCloud Director VM number of CPUs"),
            DEFAULT_CPUS.to_string(),
        ),
        with(
            flag("vcd-corespersocket", "VCD_CORESPERSOCKET", "vCloud Director VM cores per socket"),
            DEFAULT_CORES_PER_SOCKET.to_string(),
        ),
        with(
            flag("vcd-memory-size-mb", "VCD_MEMORY_SIZE_MB", "vCloud Director VM memory in MB"),
            DEFAULT_MEMORY_MB.to_string(),
        ),
        flag(
            "vcd-storageprofile",
            "VCD_STORAGEPROFILE",
            "vCloud Director storage profile (datacenter default when empty)",
        ),
        with(
            flag("vcd-description", "VCD_DESCRIPTION", "vCloud Director vApp description"),
            DEFAULT_DESCRIPTION.into(),
        ),
        with(
            flag("vcd-docker-port", "VCD_DOCKER_PORT", "Docker engine port"),
            DEFAULT_DOCKER_PORT.to_string(),
        ),
        with(
            flag("vcd-ssh-port", "VCD_SSH_PORT", "SSH port"),
            DEFAULT_SSH_PORT.to_string(),
        ),
        with(
            flag(
                "vcd-delete-when-failed",
                "VCD_DELETE_WHEN_FAILED",
                "Treat a vApp that can no longer be found as already removed",
            ),
            "true".into(),
        ),
        flag("vcd-name-prefix", "VCD_NAME_PREFIX", "Prefix for the vApp name"),
    ]
}
