use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub watch: WatchSettings,
    pub duplicates: DuplicateSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "modelist.db".to_string(),
            watch: WatchSettings::default(),
            duplicates: DuplicateSettings::default(),
        }
    }
}

/// Whether a freshly started watch imports what is already in the folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialScan {
    Emit,
    Suppress,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Quiet period a file must stay unchanged before it is imported.
    pub stability_threshold_ms: u64,
    /// How often pending files are re-checked for write activity.
    pub poll_interval_ms: u64,
    pub initial_scan: InitialScan,
    /// Reconcile every watched folder after the watchers come up.
    pub sync_on_startup: bool,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            stability_threshold_ms: 2000,
            poll_interval_ms: 100,
            initial_scan: InitialScan::Emit,
            sync_on_startup: true,
        }
    }
}

impl WatchSettings {
    pub fn stability_threshold(&self) -> Duration {
        Duration::from_millis(self.stability_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DuplicateSettings {
    pub hash_timeout_secs: u64,
    pub hash_concurrency: usize,
}

impl Default for DuplicateSettings {
    fn default() -> Self {
        Self {
            hash_timeout_secs: 30,
            hash_concurrency: 4,
        }
    }
}

impl DuplicateSettings {
    pub fn hash_timeout(&self) -> Duration {
        Duration::from_secs(self.hash_timeout_secs.max(1))
    }
}

/// Load `Config.toml` (optional) from the working directory, overlaid by
/// `MODELIST__*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("MODELIST").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
