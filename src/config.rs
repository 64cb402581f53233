use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "REDIS_EXPLORER_CONFIG";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ConnectionProfile {
    pub name: String,
    pub url: String,
    pub db: Option<u8>,
    /// Only profiles marked dev may be seeded or purged.
    pub dev: Option<bool>,
}

impl ConnectionProfile {
    pub fn is_dev(&self) -> bool {
        self.dev.unwrap_or(false)
    }
}

/// Paging knobs for the explorer controllers.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExplorerSettings {
    pub keys_page_size: usize,
    pub elements_page_size: usize,
    /// Upper bound on pages pulled by one filter/refresh while filling the first screen.
    pub fill_rounds: usize,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            keys_page_size: 500,
            elements_page_size: 100,
            fill_rounds: 16,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(rename = "connections", default)]
    pub profiles: Vec<ConnectionProfile>,
    #[serde(default)]
    pub explorer: ExplorerSettings,
}

impl Config {
    fn default_config() -> Self {
        Config {
            profiles: vec![ConnectionProfile {
                name: "Default Local".to_string(),
                url: "redis://127.0.0.1:6379".to_string(),
                db: None,
                dev: Some(true),
            }],
            explorer: ExplorerSettings::default(),
        }
    }

    /// Config file location: explicit path, then `REDIS_EXPLORER_CONFIG`, then the
    /// platform config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(path));
        }
        directories::BaseDirs::new().map(|base_dirs| {
            base_dirs
                .config_dir()
                .join("redis-explorer")
                .join("redis-explorer.toml")
        })
    }

    pub fn load(explicit: Option<&Path>) -> Self {
        let Some(config_file_path) = Self::resolve_path(explicit) else {
            log::warn!("Could not determine config directory. Using default in-memory config.");
            return Self::default_config();
        };

        if config_file_path.exists() {
            match fs::read_to_string(&config_file_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => log::warn!(
                        "Failed to parse config file at '{}': {}. Using default in-memory config.",
                        config_file_path.display(),
                        e
                    ),
                },
                Err(e) => log::warn!(
                    "Failed to read config file at '{}': {}. Using default in-memory config.",
                    config_file_path.display(),
                    e
                ),
            }
            return Self::default_config();
        }

        log::info!(
            "Config file not found at '{}'. Attempting to create a default one.",
            config_file_path.display()
        );
        let default_cfg = Self::default_config();
        if let Err(e) = default_cfg.write_to(&config_file_path) {
            log::warn!(
                "Failed to write default config file to '{}': {}",
                config_file_path.display(),
                e
            );
        }
        default_cfg
    }

    fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, toml_string)?;
        log::info!("Default config file created at '{}'", path.display());
        Ok(())
    }

    pub fn find_profile(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}
