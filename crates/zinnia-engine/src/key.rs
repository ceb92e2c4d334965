use std::fmt;

use serde::{Deserialize, Serialize};

/// Bits reserved for the per-partition counter. The partition id sits above them.
const COUNTER_BITS: u32 = 51;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Largest partition id that survives the encoding.
pub const MAX_PARTITION_ID: u16 = (1 << (u64::BITS - COUNTER_BITS)) - 1;

/// Identity of every entity the engine mints: process instances, element
/// instances, flow tokens, subscriptions and jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(u64);

impl Key {
  pub fn new(partition_id: u16, counter: u64) -> Self {
    Key(((partition_id as u64) << COUNTER_BITS) | (counter & COUNTER_MASK))
  }

  pub fn from_raw(raw: u64) -> Self {
    Key(raw)
  }

  pub fn raw(self) -> u64 {
    self.0
  }

  /// The partition (lane) that minted this key.
  pub fn partition_id(self) -> u16 {
    (self.0 >> COUNTER_BITS) as u16
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Monotonic key source owned by one partition.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
  partition_id: u16,
  next: u64,
}

impl KeyGenerator {
  pub fn new(partition_id: u16) -> Self {
    Self {
      partition_id,
      next: 1,
    }
  }

  pub fn next_key(&mut self) -> Key {
    let key = Key::new(self.partition_id, self.next);
    self.next += 1;
    key
  }
}
