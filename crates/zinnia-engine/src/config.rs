use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::key::MAX_PARTITION_ID;

/// Configuration of one processing lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Encoded into every key this lane mints. Between 1 and `MAX_PARTITION_ID`.
  pub partition_id: u16,
  /// Upper bound on commands drained for a single trigger. A step that does
  /// not reach a fixed point within it is treated as an invariant violation.
  pub max_commands_per_step: usize,
  /// Capacity of the lane's trigger channel.
  pub channel_buffer: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      partition_id: 1,
      max_commands_per_step: 10_000,
      channel_buffer: 100,
    }
  }
}

impl EngineConfig {
  pub fn for_partition(partition_id: u16) -> Self {
    Self {
      partition_id,
      ..Self::default()
    }
  }

  /// Check that keys minted under this config route back to their partition.
  pub fn validate(&self) -> Result<(), EngineError> {
    if self.partition_id == 0 || self.partition_id > MAX_PARTITION_ID {
      return Err(EngineError::PartitionOutOfRange {
        partition_id: self.partition_id,
        max: MAX_PARTITION_ID,
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    assert!(EngineConfig::default().validate().is_ok());
  }

  #[test]
  fn test_partition_id_must_fit_key_encoding() {
    assert!(EngineConfig::for_partition(MAX_PARTITION_ID).validate().is_ok());
    assert!(matches!(
      EngineConfig::for_partition(MAX_PARTITION_ID + 1).validate(),
      Err(EngineError::PartitionOutOfRange { partition_id, .. }) if partition_id == MAX_PARTITION_ID + 1
    ));
    assert!(EngineConfig::for_partition(0).validate().is_err());
  }
}
