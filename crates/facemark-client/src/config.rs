use crate::error::ClientError;
use facemark_core::Tolerance;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration: optional TOML file, then `FACEMARK_*` environment
/// variables, then defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (default: http://localhost:8000).
    pub api_url: String,
    /// V4L2 device path of the front-facing camera (default: /dev/video0).
    pub camera_device: String,
    /// Default recognition tolerance.
    pub tolerance: Tolerance,
    /// Live recognition period.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Where CSV exports are written.
    pub export_dir: PathBuf,
}

/// On-disk form. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    camera_device: Option<String>,
    tolerance: Option<f32>,
    poll_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    export_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            camera_device: "/dev/video0".to_string(),
            tolerance: Tolerance::default(),
            poll_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
            export_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load from `$FACEMARK_CONFIG` (or `$XDG_CONFIG_HOME/facemark/config.toml`)
    /// and the process environment.
    pub fn load() -> Result<Self, ClientError> {
        let path = std::env::var("FACEMARK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        let file = read_file(&path)?;
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    /// Parse a TOML document. Exposed for callers that embed config elsewhere.
    pub fn from_toml(text: &str) -> Result<Self, ClientError> {
        let file = parse_file(text)?;
        Ok(Self::from_sources(file, |_| None))
    }

    fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let tolerance = env_parse::<f32>(&env, "FACEMARK_TOLERANCE")
            .or(file.tolerance)
            .map(|t| {
                let clamped = Tolerance::clamped(t);
                if clamped.value() != t {
                    tracing::warn!(requested = t, using = %clamped, "tolerance clamped into range");
                }
                clamped
            })
            .unwrap_or(defaults.tolerance);

        Self {
            api_url: env("FACEMARK_API_URL")
                .or(file.api_url)
                .unwrap_or(defaults.api_url),
            camera_device: env("FACEMARK_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or(defaults.camera_device),
            tolerance,
            poll_interval: env_parse::<u64>(&env, "FACEMARK_POLL_INTERVAL_MS")
                .or(file.poll_interval_ms)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            request_timeout: env_parse::<u64>(&env, "FACEMARK_REQUEST_TIMEOUT_SECS")
                .or(file.request_timeout_secs)
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            export_dir: env("FACEMARK_EXPORT_DIR")
                .map(PathBuf::from)
                .or(file.export_dir)
                .unwrap_or(defaults.export_dir),
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("facemark/config.toml")
}

fn read_file(path: &Path) -> Result<FileConfig, ClientError> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            parse_file(&text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(e) => Err(ClientError::Config(format!("{}: {e}", path.display()))),
    }
}

fn parse_file(text: &str) -> Result<FileConfig, ClientError> {
    toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(FileConfig::default(), |_| None);
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.tolerance, Tolerance::default());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let file = parse_file(
            r#"
            api_url = "http://backend:9000"
            tolerance = 0.4
            poll_interval_ms = 1500
            "#,
        )
        .unwrap();
        let config = Config::from_sources(file, env_of(&[("FACEMARK_TOLERANCE", "0.6")]));
        assert_eq!(config.api_url, "http://backend:9000");
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert!((config.tolerance.value() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_tolerance_clamped() {
        let config = Config::from_sources(FileConfig::default(), env_of(&[("FACEMARK_TOLERANCE", "3")]));
        assert_eq!(config.tolerance.value(), Tolerance::MAX);
    }

    #[test]
    fn test_unparseable_env_falls_back() {
        let config = Config::from_sources(
            FileConfig::default(),
            env_of(&[("FACEMARK_POLL_INTERVAL_MS", "soon"), ("FACEMARK_REQUEST_TIMEOUT_SECS", "0")]),
        );
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("colour = \"blue\"").is_err());
    }
}
