//! Server settings, layered from an optional TOML file and `VENUEHOLD_*`
//! environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use venuehold_engine::EngineConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Seconds between in-process sweeps. `0` leaves sweeping to an external
  /// scheduler running `venuehold sweep`.
  pub sweep_interval_secs: u64,
  pub engine:              EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".to_string(),
      port:                8080,
      store_path:          PathBuf::from("venuehold.db"),
      sweep_interval_secs: 300,
      engine:              EngineConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (if it exists) and overlay the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    Self::from_builder(
      config::Config::builder()
        .add_source(config::File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self, config::ConfigError> {
    builder
      .add_source(
        config::Environment::with_prefix("VENUEHOLD")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// `store_path` with a leading `~` expanded to the user's home directory.
  pub fn resolved_store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}

#[cfg(test)]
mod tests {
  use config::{File, FileFormat};

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    ServerConfig::from_builder(
      config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
    )
    .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.sweep_interval_secs, 300);
    assert_eq!(cfg.engine.default_hold_hours, 48);
    assert_eq!(cfg.engine.max_hold_hours, 720);
    assert_eq!(cfg.engine.reorder_attempts, 5);
  }

  #[test]
  fn nested_engine_table_overrides_single_keys() {
    let cfg = parse(
      r#"
        port = 9090
        sweep_interval_secs = 0

        [engine]
        max_hold_hours = 168
      "#,
    );
    assert_eq!(cfg.address(), "127.0.0.1:9090");
    assert_eq!(cfg.sweep_interval_secs, 0);
    assert_eq!(cfg.engine.max_hold_hours, 168);
    assert_eq!(cfg.engine.default_hold_hours, 48);
  }

  #[test]
  fn relative_store_path_is_untouched() {
    let cfg = parse(r#"store_path = "data/holds.db""#);
    assert_eq!(cfg.resolved_store_path(), PathBuf::from("data/holds.db"));
  }
}
