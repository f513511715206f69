//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$EAXSTAG_CONFIG` (environment variable)
//! 2. `~/.config/eaxstag/config.toml` (Linux/macOS)
//!    `%APPDATA%\eaxstag\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! All values are read once at startup and passed into components at
//! construction; nothing reads shared mutable defaults afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Annotation service settings.
    pub service: ServiceConfig,
    /// Tagged output settings.
    pub output: OutputConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Annotation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the annotation service.
    pub url: String,
    /// Path of the pattern mapping file, relative to the service's own file
    /// directory.
    pub mapping_file: String,
    /// Maximum number of characters sent to the service in one request.
    pub chunk_size: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Make one extra attempt when a chunk comes back empty.
    pub retry: bool,
    /// Service tags that mean "no finding"; normalized to the empty tag.
    pub background_tags: Vec<String>,
    /// Tags built into the service. These may be overridden by custom
    /// patterns from `mapping_file` and are credited to the service's
    /// authority domain in the output.
    pub builtin_tags: Vec<String>,
    /// Authority domain recorded on tokens carrying a builtin tag.
    pub builtin_authority: String,
}

/// Tagged output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Character encoding label used to decode base64 / quoted-printable
    /// message bodies (e.g. "UTF-8", "windows-1252").
    pub charset: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9003".to_string(),
            mapping_file: "regexner_TOMES/mappings.txt".to_string(),
            chunk_size: 50_000,
            timeout_secs: 60,
            retry: true,
            background_tags: [
                "DATE", "DURATION", "MISC", "MONEY", "NUMBER", "O", "ORDINAL", "PERCENT",
                "SET", "TIME",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            builtin_tags: [
                "DATE",
                "DURATION",
                "LOCATION",
                "MISC",
                "MONEY",
                "NUMBER",
                "O",
                "ORDINAL",
                "ORGANIZATION",
                "PERCENT",
                "PERSON",
                "SET",
                "TIME",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            builtin_authority: "stanford.edu".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            charset: "UTF-8".to_string(),
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("EAXSTAG_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("eaxstag").join("config.toml"))
}

/// Return the directory used for the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eaxstag")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.service.url, "http://localhost:9003");
        assert_eq!(cfg.service.chunk_size, 50_000);
        assert!(cfg.service.retry);
        assert_eq!(cfg.output.charset, "UTF-8");
        assert!(cfg.service.background_tags.contains(&"O".to_string()));
        // LOCATION is builtin but never a background tag.
        assert!(!cfg.service.background_tags.contains(&"LOCATION".to_string()));
        assert!(cfg.service.builtin_tags.contains(&"LOCATION".to_string()));
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.service.url, cfg.service.url);
        assert_eq!(parsed.service.chunk_size, cfg.service.chunk_size);
        assert_eq!(parsed.output.charset, cfg.output.charset);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[service]
url = "http://nlp.internal:9000"
chunk_size = 1000
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.service.url, "http://nlp.internal:9000");
        assert_eq!(cfg.service.chunk_size, 1000);
        // Other fields use defaults
        assert_eq!(cfg.service.timeout_secs, 60);
        assert_eq!(cfg.general.log_level, "warn");
    }
}
