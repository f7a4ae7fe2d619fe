//! Configuration management for the journey migrator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (journey-migrator.toml)
//! - Environment variables (JOURNEY_MIGRATOR__*)
//!
//! ## Example config file (journey-migrator.toml):
//! ```toml
//! [connection]
//! tenant = "https://openam-acme.forgeblocks.com/am"
//! realm = "alpha"
//! username = "admin@acme.com"
//! deployment = "cloud"
//!
//! [export]
//! output_format = "pretty"
//! output_dir = "./journeys"
//!
//! [import]
//! re_uuid = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fingerprint::OriginFingerprint;

/// Main configuration for the migrator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Environment connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Import settings
    #[serde(default)]
    pub import: ImportConfig,
}

/// Deployment variant of the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Identity cloud tenant
    #[default]
    Cloud,
    /// Self-managed platform with IDM
    ForgeOps,
    /// Access manager without IDM
    Classic,
}

impl Deployment {
    /// Hosted email templates live in IDM
    pub fn supports_email_templates(&self) -> bool {
        matches!(self, Deployment::Cloud | Deployment::ForgeOps)
    }

    /// Hosted UI themes live in IDM
    pub fn supports_themes(&self) -> bool {
        matches!(self, Deployment::Cloud | Deployment::ForgeOps)
    }
}

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Base URL of the access manager, e.g. `https://host/am`
    #[serde(default)]
    pub tenant: String,

    /// Realm path, `alpha` or `/parent/child`
    #[serde(default = "default_realm")]
    pub realm: String,

    /// User recorded as the exporter in bundle metadata
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub deployment: Deployment,

    /// Session token sent as a cookie
    #[serde(default)]
    pub session_token: Option<String>,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Platform version override; detected from the server when absent
    #[serde(default)]
    pub platform_version: Option<String>,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output format (pretty or compact)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Collect scripts, templates, providers and themes
    #[serde(default = "default_true")]
    pub include_dependencies: bool,

    /// Directory bundle files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Generate fresh node ids on import
    #[serde(default = "default_true")]
    pub re_uuid: bool,

    /// Write scripts, templates, providers and themes
    #[serde(default = "default_true")]
    pub include_dependencies: bool,

    /// Renames tried for a conflicting script before giving up
    #[serde(default = "default_max_rename_attempts")]
    pub max_rename_attempts: u32,
}

// Default value functions
fn default_realm() -> String {
    "alpha".to_string()
}

fn default_cookie_name() -> String {
    "iPlanetDirectoryPro".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_rename_attempts() -> u32 {
    10
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            realm: default_realm(),
            username: None,
            deployment: Deployment::default(),
            session_token: None,
            cookie_name: default_cookie_name(),
            timeout_secs: default_timeout_secs(),
            platform_version: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pretty,
            include_dependencies: true,
            output_dir: default_output_dir(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            re_uuid: true,
            include_dependencies: true,
            max_rename_attempts: default_max_rename_attempts(),
        }
    }
}

impl ConnectionConfig {
    /// Fingerprint of this tenant + realm
    pub fn fingerprint(&self) -> OriginFingerprint {
        OriginFingerprint::new(&self.tenant, &self.realm)
    }

    /// Realm name without leading slash; the root realm is `/`
    pub fn realm_name(&self) -> &str {
        let trimmed = self.realm.trim_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }

    /// Identity resource of the realm's managed users
    pub fn managed_user_resource(&self) -> String {
        match self.deployment {
            Deployment::Cloud => {
                let realm = self.realm_name().rsplit('/').next().unwrap_or_default();
                format!("managed/{}_user", realm)
            }
            Deployment::ForgeOps | Deployment::Classic => "managed/user".to_string(),
        }
    }
}

impl MigratorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "journey-migrator.toml",
            ".journey-migrator.toml",
            "config/journey-migrator.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) =
            directories::ProjectDirs::from("dev", "familiar", "journey-migrator")
        {
            let xdg_config = config_dir.config_dir().join("journey-migrator.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // JOURNEY_MIGRATOR__CONNECTION__TENANT etc.
        builder = builder.add_source(
            Environment::with_prefix("JOURNEY_MIGRATOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Output directory (resolves relative paths)
    pub fn output_dir(&self) -> PathBuf {
        if self.export.output_dir.is_absolute() {
            self.export.output_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.export.output_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigratorConfig::default();
        assert_eq!(config.connection.realm, "alpha");
        assert_eq!(config.connection.deployment, Deployment::Cloud);
        assert!(config.import.re_uuid);
        assert_eq!(config.import.max_rename_attempts, 10);
    }

    #[test]
    fn test_serialize_config() {
        let config = MigratorConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[connection]"));
        assert!(toml_str.contains("[export]"));
        assert!(toml_str.contains("[import]"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrator.toml");
        std::fs::write(
            &path,
            "[connection]\ntenant = \"https://example.com/am\"\nrealm = \"bravo\"\ndeployment = \"classic\"\n",
        )
        .unwrap();

        let config = MigratorConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.connection.tenant, "https://example.com/am");
        assert_eq!(config.connection.realm, "bravo");
        assert!(!config.connection.deployment.supports_email_templates());
    }

    #[test]
    fn test_managed_user_resource() {
        let mut connection = ConnectionConfig::default();
        assert_eq!(connection.managed_user_resource(), "managed/alpha_user");

        connection.realm = "/parent/bravo".to_string();
        assert_eq!(connection.managed_user_resource(), "managed/bravo_user");

        connection.deployment = Deployment::ForgeOps;
        assert_eq!(connection.managed_user_resource(), "managed/user");
    }
}
