//! Layered settings: built-in defaults, an optional config file, then
//! `SYNC_GATEWAY__*` environment overrides — the same three-tier load order
//! `control::config` uses, adapted to the `config` crate's 0.14 builder API.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub replication: ReplicationSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Mirrors the constants in `sync_replicator::replicator` (§5): exposed here
/// as overridable defaults even though the current Replicator still takes
/// them from its own compile-time constants rather than these settings
/// (see DESIGN.md).
#[derive(Debug, Deserialize, Clone)]
pub struct ReplicationSettings {
    pub batcher_capacity: usize,
    pub batcher_delay_ms: u64,
    pub checkpoint_coalesce_secs: u64,
    pub retry_delay_secs: u64,
}

/// Loads settings from built-in defaults, then an optional file at
/// `config_path`, then `SYNC_GATEWAY__APPLICATION__PORT`-style environment
/// variables.
pub fn load_settings(config_path: Option<&std::path::Path>) -> anyhow::Result<Settings> {
    let mut builder = config::Config::builder()
        .set_default("application.host", "0.0.0.0")?
        .set_default("application.port", 5984)?
        .set_default("replication.batcher_capacity", 100)?
        .set_default("replication.batcher_delay_ms", 500)?
        .set_default("replication.checkpoint_coalesce_secs", 5)?
        .set_default("replication.retry_delay_secs", 60)?;

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SYNC_GATEWAY")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.application.port, 5984);
        assert_eq!(settings.replication.batcher_capacity, 100);
    }

    #[test]
    fn address_combines_host_and_port() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.application.address(), "0.0.0.0:5984");
    }
}
