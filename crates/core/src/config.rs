use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tool configuration, read from `web2apk.yml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub watch: WatchConfig,
    pub project: ProjectConfig,
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "web2apk.yml";

    /// Load the configuration file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let file = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        serde_yaml::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
}

impl GitHubConfig {
    /// The configured token, or `GITHUB_TOKEN` / `GH_TOKEN` from the environment.
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
            .or_else(|| std::env::var("GH_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_secs: u64,
    pub max_attempts: u32,
    /// Delay before the first lookup, so the provider can register the pushed run.
    pub initial_delay_secs: u64,
    /// Extension (without the dot) identifying the payload file.
    pub payload_extension: String,
    pub output_dir: PathBuf,
    /// File name of the staged payload inside `output_dir`.
    pub payload_name: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_attempts: 180,
            initial_delay_secs: 10,
            payload_extension: "apk".to_string(),
            output_dir: PathBuf::from("downloads"),
            payload_name: "app-debug.apk".to_string(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration { Duration::from_secs(self.poll_interval_secs) }

    pub fn initial_delay(&self) -> Duration { Duration::from_secs(self.initial_delay_secs) }

    /// Upper bound on the time spent polling, excluding the initial delay.
    pub fn budget(&self) -> Duration { self.poll_interval() * self.max_attempts }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub web_dir: PathBuf,
    pub app_config: PathBuf,
    pub remote: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            web_dir: PathBuf::from("www"),
            app_config: PathBuf::from("apk-config.json"),
            remote: "origin".to_string(),
        }
    }
}

impl ProjectConfig {
    pub fn web_dir(&self) -> PathBuf { self.root.join(&self.web_dir) }

    pub fn app_config(&self) -> PathBuf { self.root.join(&self.app_config) }
}

/// App settings handed to the packaging project, read from `apk-config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_name: String,
    pub app_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: IconConfig,
    #[serde(default, alias = "splashScreen")]
    pub splash: SplashConfig,
    /// Keys this tool does not understand, kept so that saving is lossless.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_version() -> String { "1.0.0".to_string() }

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        );
        serde_json::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IconConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SplashConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
    pub color: String,
}

impl Default for SplashConfig {
    fn default() -> Self { Self { enabled: false, path: None, color: "#ffffff".to_string() } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_yaml::from_str("watch:\n  max_attempts: 5\n").unwrap();
        assert_eq!(config.watch.max_attempts, 5);
        assert_eq!(config.watch.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.watch.payload_extension, "apk");
        assert_eq!(config.project.remote, "origin");
        assert_eq!(WatchConfig::default().budget(), Duration::from_secs(1800));
    }

    #[test]
    fn test_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("web2apk.yml")).unwrap();
        assert_eq!(config.watch.max_attempts, 180);
    }

    #[test]
    fn test_app_config_splash_alias() {
        let json = r##"{
            "appName": "My App",
            "appId": "com.example.app",
            "splashScreen": { "enabled": true, "path": "splash.png" },
            "theme": "dark"
        }"##;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.version, "1.0.0");
        assert!(config.splash.enabled);
        assert_eq!(config.splash.color, "#ffffff");
        assert!(!config.icon.enabled);
        assert_eq!(config.extra.get("theme"), Some(&serde_json::json!("dark")));
    }

    #[test]
    fn test_app_config_save_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apk-config.json");
        std::fs::write(&path, r#"{"appName":"A","appId":"com.a","tone":"friendly"}"#).unwrap();
        let mut config = AppConfig::load(&path).unwrap();
        config.version = "1.0.1".to_string();
        config.save(&path).unwrap();
        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.version, "1.0.1");
        assert_eq!(reloaded.extra.get("tone"), Some(&serde_json::json!("friendly")));
    }
}
