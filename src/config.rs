use anyhow::{Context, Result};
use config::{Environment, File};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub planner: PlannerConfig,
    pub telemetry: TelemetryConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    pub base_url: String,
    #[serde(default = "default_planner_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Engine.IO websocket endpoint, e.g. `ws://host:8080/socket.io/?EIO=4&transport=websocket`.
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub auto_connect: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

fn default_planner_timeout() -> u64 {
    120
}

fn default_namespace() -> String {
    "/ws/telemetry".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

impl Config {
    pub fn load() -> Result<Self> {
        let env = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let config_path = PathBuf::from(format!("config/{}.toml", env));

        let path = if config_path.exists() {
            config_path
        } else {
            dirs::config_dir()
                .context("Failed to get config directory")?
                .join("gcs-console")
                .join(format!("{}.toml", env))
        };

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("GCS").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_sections_and_fills_defaults() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[general]
log_level = "info"

[planner]
base_url = "http://localhost:5000"

[telemetry]
url = "ws://localhost:8080/socket.io/?EIO=4&transport=websocket"

[web]
host = "127.0.0.1"
port = 3000
"#
        )?;

        let config = Config::load_from(file.path())?;
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.planner.base_url, "http://localhost:5000");
        assert_eq!(config.planner.timeout_secs, 120);
        assert_eq!(config.telemetry.namespace, "/ws/telemetry");
        assert_eq!(config.telemetry.connect_timeout_secs, 5);
        assert!(!config.telemetry.auto_connect);
        assert_eq!(config.web.port, 3000);
        Ok(())
    }

    #[test]
    fn missing_section_is_an_error() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "[general]\nlog_level = \"info\"")?;

        assert!(Config::load_from(file.path()).is_err());
        Ok(())
    }
}
