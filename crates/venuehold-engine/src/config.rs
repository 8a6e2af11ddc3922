//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Hold length when the caller does not choose one.
  pub default_hold_hours: u32,
  /// Longest hold a caller may request.
  pub max_hold_hours:     u32,
  /// How many times a reorder is retried when the slot's live entry set
  /// changes underneath it before giving up with a conflict.
  pub reorder_attempts:   u32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_hold_hours: 48,
      max_hold_hours:     720,
      reorder_attempts:   5,
    }
  }
}
