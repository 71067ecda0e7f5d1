//! Error types for the vCloud Director driver.
//!
//! Messages follow one format: `"<operation> failed: <reason>"` for failed
//! operations and `"<entity> not found: <name>"` for missing resources, all
//! lowercase. Nothing in the driver retries; every error is handed back to
//! the orchestrator as-is.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using the driver's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of named remote resource a lookup was searching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Org,
    Vdc,
    Network,
    Catalog,
    CatalogItem,
    Template,
    StorageProfile,
    VApp,
    Vm,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Org => "org",
            ResourceKind::Vdc => "vdc",
            ResourceKind::Network => "org vdc network",
            ResourceKind::Catalog => "catalog",
            ResourceKind::CatalogItem => "catalog item",
            ResourceKind::Template => "vapp template",
            ResourceKind::StorageProfile => "storage profile",
            ResourceKind::VApp => "vapp",
            ResourceKind::Vm => "vm",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in driver operations.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    /// Configuration is incomplete or malformed. Raised before any network call.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The defaults file could not be parsed.
    #[error("defaults file parse failed: {}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // ========================================================================
    // Control plane
    // ========================================================================
    /// Bad credentials or unreachable endpoint.
    #[error("authentication to org {org:?} failed: {reason}")]
    Authentication { org: String, reason: String },

    /// A named resource does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// The composed vApp does not hold exactly one VM.
    #[error("vapp composition failed: expected exactly 1 vm, found {count}")]
    Composition { count: usize },

    /// The control plane reported a task failure.
    #[error("{operation} failed: {message}")]
    TaskFailed { operation: String, message: String },

    /// A task did not finish within its wait budget.
    #[error("{operation} failed: task still running after {}s", waited.as_secs())]
    TaskTimeout { operation: String, waited: Duration },

    /// The composed VM never reached the powered-off state.
    #[error("vm deploy failed: not powered off after {}s", waited.as_secs())]
    DeployTimeout { waited: Duration },

    /// The control plane answered with a non-success status.
    #[error("api request failed: http {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level HTTP failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body did not match the expected representation.
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Machine
    // ========================================================================
    /// No network adapter carries an address.
    #[error("ip address not found: vm has no configured address")]
    AddressUnavailable,

    /// The machine must be running for the requested query.
    #[error("invalid machine state: expected running, got {state}")]
    NotRunning { state: String },

    /// SSH key generation or reading failed.
    #[error("ssh key generation failed: {0}")]
    KeyGeneration(String),

    /// Reading or writing the machine store failed.
    #[error("machine store operation failed: {}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Store {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the error says a remote object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_resource() {
        let err = Error::not_found(ResourceKind::StorageProfile, "gold");
        assert_eq!(err.to_string(), "storage profile not found: gold");
        assert!(err.is_not_found());
    }

    #[test]
    fn http_404_counts_as_not_found() {
        let err = Error::Api {
            status: 404,
            message: "gone".into(),
        };
        assert!(err.is_not_found());
        assert!(!Error::AddressUnavailable.is_not_found());
    }

    #[test]
    fn composition_message_reports_count() {
        let err = Error::Composition { count: 2 };
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn store_message_leaves_cause_to_the_source_chain() {
        let err = Error::store(
            "/store/machines/web/config.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(
            err.to_string(),
            "machine store operation failed: /store/machines/web/config.json"
        );
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("no such file"));
    }

    #[test]
    fn deploy_timeout_reports_seconds() {
        let err = Error::DeployTimeout {
            waited: Duration::from_secs(900),
        };
        assert_eq!(err.to_string(), "vm deploy failed: not powered off after 900s");
    }
}
