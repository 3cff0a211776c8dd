//! Configuration file handling for tuya-cli

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tuya_client::{Credentials, Region};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Cloud project access id
    pub client_id: Option<String>,
    /// Cloud project access secret
    pub client_secret: Option<String>,
    /// Data center, e.g. "eu"
    pub region: Option<String>,
    /// Override the regional API host
    pub base_url: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("tuya-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: &ArgOverrides<'_>) -> Result<MergedConfig> {
        let client_id = args
            .client_id
            .map(String::from)
            .or_else(|| self.client_id.clone())
            .filter(|s| !s.is_empty());
        let client_secret = args
            .client_secret
            .map(String::from)
            .or_else(|| self.client_secret.clone())
            .filter(|s| !s.is_empty());

        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            bail!("Set TUYA_CLIENT_ID and TUYA_CLIENT_SECRET (or client_id/client_secret in the config file)");
        };

        let region = args
            .region
            .or(self.region.as_deref())
            .unwrap_or("eu")
            .parse::<Region>()
            .context("Invalid region")?;

        Ok(MergedConfig {
            credentials: Credentials::new(client_id, client_secret, region),
            base_url: args
                .base_url
                .map(String::from)
                .or_else(|| self.base_url.clone()),
            output: args
                .output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "table".to_string()),
            no_color: args.no_color || self.no_color.unwrap_or(false),
        })
    }
}

/// Values given on the command line (or through the environment)
#[derive(Debug, Default)]
pub struct ArgOverrides<'a> {
    pub client_id: Option<&'a str>,
    pub client_secret: Option<&'a str>,
    pub region: Option<&'a str>,
    pub base_url: Option<&'a str>,
    pub output: Option<&'a str>,
    pub no_color: bool,
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub credentials: Credentials,
    pub base_url: Option<String>,
    pub output: String,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "client_id = \"file-id\"\nclient_secret = \"file-secret\"\nregion = \"us\""
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.client_id.as_deref(), Some("file-id"));
        assert_eq!(config.region.as_deref(), Some("us"));
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client_id = [").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            client_id: Some("file-id".into()),
            client_secret: Some("file-secret".into()),
            region: Some("us".into()),
            ..Default::default()
        };
        let merged = config
            .merge_with_args(&ArgOverrides {
                client_id: Some("arg-id"),
                region: Some("cn"),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(merged.credentials.client_id, "arg-id");
        assert_eq!(merged.credentials.client_secret, "file-secret");
        assert_eq!(merged.credentials.region, Region::Cn);
        assert_eq!(merged.output, "table");
    }

    #[test]
    fn test_region_defaults_to_eu() {
        let merged = Config::default()
            .merge_with_args(&ArgOverrides {
                client_id: Some("id"),
                client_secret: Some("secret"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(merged.credentials.region, Region::Eu);
    }

    #[test]
    fn test_missing_credentials() {
        let err = Config::default()
            .merge_with_args(&ArgOverrides {
                client_id: Some("id"),
                client_secret: Some(""),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("TUYA_CLIENT_SECRET"));
    }
}
