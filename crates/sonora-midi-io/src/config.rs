//! Virtual port configuration.

use serde::{Deserialize, Serialize};

use crate::endpoint::UniqueId;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualPortConfig {
    /// Client name registered with the host; also the fallback port name.
    pub client_name: String,
    /// First auto-assigned unique ID for batch inputs.
    pub input_base_id: UniqueId,
    /// First auto-assigned unique ID for batch outputs.
    pub output_base_id: UniqueId,
    /// Step between consecutive auto-assigned IDs of one direction.
    pub id_stride: i32,
}

impl Default for VirtualPortConfig {
    fn default() -> Self {
        Self {
            client_name: "Sonora".to_string(),
            input_base_id: UniqueId::DEFAULT_INPUT,
            output_base_id: UniqueId::DEFAULT_OUTPUT,
            id_stride: 2,
        }
    }
}

impl VirtualPortConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return Err(Error::InvalidConfig("client name is empty".to_string()));
        }
        if self.id_stride <= 0 {
            return Err(Error::InvalidConfig(format!(
                "id stride must be positive, got {}",
                self.id_stride
            )));
        }
        if self.input_base_id == self.output_base_id {
            return Err(Error::InvalidConfig(format!(
                "input and output base IDs are both {}",
                self.input_base_id
            )));
        }
        // Disjoint iff the bases are in different residue classes
        let offset = (self.output_base_id.get() as i64 - self.input_base_id.get() as i64)
            .rem_euclid(self.id_stride as i64);
        if offset == 0 {
            return Err(Error::InvalidConfig(format!(
                "input base {} and output base {} overlap with stride {}",
                self.input_base_id, self.output_base_id, self.id_stride
            )));
        }
        Ok(())
    }
}
