//! The persisted machine record.
//!
//! One JSON document per machine holding the driver configuration and the
//! two remote locators. It is the only state that survives between driver
//! invocations.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DriverConfig;
use crate::driver::VmHandle;
use crate::error::{Error, Result};

pub const DRIVER_NAME: &str = "vcd";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MachineRecord {
    pub machine_name: String,
    /// Name the vApp was composed under. Restored as is, since a generated
    /// name cannot be derived again.
    #[serde(default)]
    pub vapp_name: String,
    pub driver_name: String,
    pub created_at: DateTime<Utc>,
    pub config: DriverConfig,
    #[serde(default)]
    pub handle: VmHandle,
}

impl MachineRecord {
    pub fn new(
        machine_name: impl Into<String>,
        vapp_name: impl Into<String>,
        config: DriverConfig,
        handle: VmHandle,
    ) -> Self {
        Self {
            machine_name: machine_name.into(),
            vapp_name: vapp_name.into(),
            driver_name: DRIVER_NAME.to_string(),
            created_at: Utc::now(),
            config,
            handle,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::store(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the record atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| Error::store(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| Error::store(path, e))?;
        Ok(())
    }
}
