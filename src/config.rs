/// Configuration (option table, ambient component L).
///
/// `StoreConfig` carries one field per recognized option, with defaults
/// matching the documented table exactly. Settings load from a TOML file
/// via the `config` crate, overridable by environment variables, with a
/// process-wide `OnceCell` for binaries that want a single global instance
/// alongside a plain constructor for library and test use.
pub use config::Config as RawConfig;
pub use once_cell::sync::OnceCell;
use std::error::Error;

use crate::migration::TriggerPolicy;

static GLOBAL_CONFIG: OnceCell<StoreConfig> = OnceCell::new();

/// Typed settings for one processor instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub processor_id: String,
    pub state_table: String,
    pub network: String,
    pub support_hot_blocks: bool,
    pub hot_blocks_depth: u64,
    pub height_column_name: String,
    pub auto_migrate: bool,
    pub migration_interval: u64,
    pub migration_on_finality: bool,
    /// Directories consumed by the external schema loader (non-goal); the
    /// core only needs the `Vec<ManagedTable>` that loader produces.
    pub tables_path: String,
    pub hot_supported_tables_path: String,
    /// Open question: staleness threshold and quick-restart
    /// trust are accepted here but not yet consulted by the reconciler —
    /// see DESIGN.md.
    pub stale_hot_blocks_threshold_ms: u64,
    pub trust_hot_blocks_on_quick_restart: bool,
    pub database_url: String,
}

impl StoreConfig {
    /// The trigger policy implied by `migration_interval`/
    /// `migration_on_finality`.
    pub fn migration_trigger(&self) -> TriggerPolicy {
        if self.migration_on_finality {
            TriggerPolicy::OnFinalityAdvance
        } else {
            TriggerPolicy::EveryNBlocks(self.migration_interval)
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            processor_id: "default".to_string(),
            state_table: "squid_processor_status".to_string(),
            network: "ethereum".to_string(),
            support_hot_blocks: true,
            hot_blocks_depth: 10,
            height_column_name: "height".to_string(),
            auto_migrate: true,
            migration_interval: 30,
            migration_on_finality: false,
            tables_path: "./tables".to_string(),
            hot_supported_tables_path: "./tables/hot".to_string(),
            stale_hot_blocks_threshold_ms: 600_000,
            trust_hot_blocks_on_quick_restart: true,
            database_url: "http://localhost:8123".to_string(),
        }
    }
}

impl StoreConfig {
    /// Builds from a `RawConfig` loaded via the `config` crate, falling
    /// back to the documented default for any absent key.
    pub fn from_raw(raw: &RawConfig) -> Self {
        let defaults = StoreConfig::default();
        Self {
            processor_id: raw.get_string("processor_id").unwrap_or(defaults.processor_id),
            state_table: raw.get_string("state_table").unwrap_or(defaults.state_table),
            network: raw.get_string("network").unwrap_or(defaults.network),
            support_hot_blocks: raw.get_bool("support_hot_blocks").unwrap_or(defaults.support_hot_blocks),
            hot_blocks_depth: raw
                .get_int("hot_blocks_depth")
                .map(|v| v as u64)
                .unwrap_or(defaults.hot_blocks_depth),
            height_column_name: raw.get_string("height_column_name").unwrap_or(defaults.height_column_name),
            auto_migrate: raw.get_bool("auto_migrate").unwrap_or(defaults.auto_migrate),
            migration_interval: raw
                .get_int("migration_interval")
                .map(|v| v as u64)
                .unwrap_or(defaults.migration_interval),
            migration_on_finality: raw.get_bool("migration_on_finality").unwrap_or(defaults.migration_on_finality),
            tables_path: raw.get_string("tables_path").unwrap_or(defaults.tables_path),
            hot_supported_tables_path: raw
                .get_string("hot_supported_tables_path")
                .unwrap_or(defaults.hot_supported_tables_path),
            stale_hot_blocks_threshold_ms: raw
                .get_int("stale_hot_blocks_threshold_ms")
                .map(|v| v as u64)
                .unwrap_or(defaults.stale_hot_blocks_threshold_ms),
            trust_hot_blocks_on_quick_restart: raw
                .get_bool("trust_hot_blocks_on_quick_restart")
                .unwrap_or(defaults.trust_hot_blocks_on_quick_restart),
            database_url: raw.get_string("database_url").unwrap_or(defaults.database_url),
        }
    }
}

/// Loads `config.toml` from the current directory, overridable by
/// environment variables prefixed `STORE_` (e.g. `STORE_NETWORK=polygon`).
pub fn load_config() -> Result<StoreConfig, Box<dyn Error>> {
    let raw = RawConfig::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(config::Environment::with_prefix("STORE"))
        .build()?;
    Ok(StoreConfig::from_raw(&raw))
}

pub fn init_global_config() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    GLOBAL_CONFIG.set(config).map_err(|_| "config already set")?;
    Ok(())
}

pub fn get_global_config() -> &'static StoreConfig {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: config not initialized - call init_global_config() first");
        std::process::exit(1);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let d = StoreConfig::default();
        assert_eq!(d.processor_id, "default");
        assert_eq!(d.state_table, "squid_processor_status");
        assert_eq!(d.network, "ethereum");
        assert!(d.support_hot_blocks);
        assert_eq!(d.hot_blocks_depth, 10);
        assert_eq!(d.height_column_name, "height");
        assert_eq!(d.migration_interval, 30);
        assert!(!d.migration_on_finality);
        assert_eq!(d.stale_hot_blocks_threshold_ms, 600_000);
        assert!(d.trust_hot_blocks_on_quick_restart);
        assert_eq!(d.migration_trigger(), TriggerPolicy::EveryNBlocks(30));
    }
}
