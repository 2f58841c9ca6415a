//! Layered configuration.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `painel.toml` in the user config directory
//! 3. `./painel.toml`
//! 4. `PAINEL_*` environment variables

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use painel_core::{ChannelMap, ChannelSettings};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PainelConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub channels: ChannelSettings,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `<data dir>/painel.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Local status cache file. Defaults to `<data dir>/status_cache.json`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Conversations untouched for longer than this are auto-resolved.
    pub max_age_hours: u64,
}

impl SweeperConfig {
    /// Longest sweep interval accepted: one year.
    pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 3600;

    /// Age after which a conversation is auto-resolved.
    pub fn max_age(&self) -> Result<chrono::Duration> {
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                WorkerError::InvalidConfig(format!(
                    "sweeper.max_age_hours is out of range: {}",
                    self.max_age_hours
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        self.max_age()?;
        if self.interval_secs == 0 || self.interval_secs > Self::MAX_INTERVAL_SECS {
            return Err(WorkerError::InvalidConfig(format!(
                "sweeper.interval_secs must be between 1 and {}, got {}",
                Self::MAX_INTERVAL_SECS,
                self.interval_secs
            )));
        }
        Ok(())
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            max_age_hours: 24,
        }
    }
}

impl PainelConfig {
    pub fn channel_map(&self) -> Result<ChannelMap> {
        Ok(ChannelMap::from_settings(&self.channels)?)
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("status_cache.json")),
        }
    }
}

pub fn load_config() -> Result<PainelConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(PainelConfig::default()));

    if let Some(dirs) = project_dirs() {
        figment = figment.merge(Toml::file(dirs.config_dir().join("painel.toml")));
    }

    extract(figment.merge(Toml::file("painel.toml")).merge(env_provider()))
}

pub fn load_config_from_path(path: &Path) -> Result<PainelConfig> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(PainelConfig::default()))
            .merge(Toml::file(path))
            .merge(env_provider()),
    )
}

pub fn load_config_from_str(toml_content: &str) -> Result<PainelConfig> {
    extract(
        Figment::new()
            .merge(Serialized::defaults(PainelConfig::default()))
            .merge(Toml::string(toml_content)),
    )
}

fn extract(figment: Figment) -> Result<PainelConfig> {
    let config: PainelConfig = figment.extract().map_err(Box::new)?;
    // Fail early on a broken channel map instead of at first lookup.
    config.channel_map()?;
    config.sweeper.validate()?;
    Ok(config)
}

/// `PAINEL_SWEEPER_INTERVAL_SECS` -> `sweeper.interval_secs`
fn env_provider() -> Env {
    Env::prefixed("PAINEL_").map(|key| {
        // Keys arrive in their original case.
        let mapped = key
            .as_str()
            .to_ascii_lowercase()
            .replacen("database_", "database.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("sweeper_", "sweeper.", 1);
        mapped.into()
    })
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com.br", "painel", "painel")
}

pub(crate) fn data_dir() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(WorkerError::DataDirNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = load_config_from_str("").unwrap();
        assert!(config.sweeper.enabled);
        assert_eq!(config.sweeper.interval_secs, 3600);
        assert_eq!(config.sweeper.max_age_hours, 24);
        assert!(config.database.path.is_none());
        assert_eq!(config.channel_map().unwrap().resolve_table("canarana"), "chat_canarana");
    }

    #[test]
    fn test_override_sweeper_and_paths() {
        let config = load_config_from_str(
            r#"
            [database]
            path = "/tmp/painel-test.db"

            [sweeper]
            interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/painel-test.db")));
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.sweeper.max_age_hours, 24);
    }

    #[test]
    fn test_custom_channels() {
        let config = load_config_from_str(
            r#"
            [channels]
            default_channel = "geral"

            [[channels.channels]]
            id = "geral"
            table = "mensagens_geral"
            display_name = "Geral"

            [[channels.channels]]
            id = "0b8f6c3e-1a2d-4e5f-9a8b-7c6d5e4f3a2b"
            slugs = ["sorriso"]
            table = "mensagens_sorriso"
            display_name = "Loja Sorriso"
            "#,
        )
        .unwrap();

        let map = config.channel_map().unwrap();
        assert_eq!(map.resolve_table("sorriso"), "mensagens_sorriso");
        assert_eq!(map.resolve_table("desconhecido"), "mensagens_geral");
    }

    #[test]
    fn test_invalid_channel_map_is_rejected() {
        let result = load_config_from_str(
            r#"
            [channels]
            default_channel = "missing"
            channels = []
            "#,
        );
        assert!(matches!(result, Err(WorkerError::Core(_))));
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PAINEL_DATABASE_PATH", "/tmp/painel-env.db");
            jail.set_env("PAINEL_CACHE_PATH", "/tmp/painel-env-cache.json");
            jail.set_env("PAINEL_SWEEPER_INTERVAL_SECS", "60");
            jail.set_env("PAINEL_SWEEPER_MAX_AGE_HOURS", "48");

            let config = extract(
                Figment::new()
                    .merge(Serialized::defaults(PainelConfig::default()))
                    .merge(env_provider()),
            )
            .map_err(|e| e.to_string())?;

            assert_eq!(config.database.path, Some(PathBuf::from("/tmp/painel-env.db")));
            assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/painel-env-cache.json")));
            assert_eq!(config.sweeper.interval_secs, 60);
            assert_eq!(config.sweeper.max_age_hours, 48);
            assert!(config.sweeper.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[sweeper]\ninterval_secs = 120")?;
            jail.set_env("PAINEL_SWEEPER_INTERVAL_SECS", "30");

            let config =
                load_config_from_path(Path::new("custom.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.sweeper.interval_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_out_of_range_max_age_is_rejected() {
        let result = load_config_from_str(
            r#"
            [sweeper]
            max_age_hours = 9223372036854775807
            "#,
        );
        assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = load_config_from_str("[sweeper]\ninterval_secs = 0");
        assert!(matches!(result, Err(WorkerError::InvalidConfig(_))));
    }

    #[test]
    fn test_max_age_conversion() {
        let config = SweeperConfig::default();
        assert_eq!(config.max_age().unwrap(), chrono::Duration::hours(24));

        let huge = SweeperConfig {
            max_age_hours: u64::MAX / 2,
            ..SweeperConfig::default()
        };
        assert!(huge.max_age().is_err());
    }

    #[test]
    fn test_bad_type_is_a_config_error() {
        let result = load_config_from_str(
            r#"
            [sweeper]
            interval_secs = "hourly"
            "#,
        );
        assert!(matches!(result, Err(WorkerError::Config(_))));
    }
}
