//! Server configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use parley_core::{ParleyError, ParleyResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_data_dir() -> String {
    "~/.parley".to_string()
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_data_dir: Option<&str>,
    ) -> ParleyResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| ParleyError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let port = cli_port.unwrap_or(file_config.server.port);
        let data_dir = cli_data_dir
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.data_dir);

        Ok(Self {
            port,
            data_dir: expand_tilde_str(&data_dir),
        })
    }

    /// Path of the durable user directory file.
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.jsonl")
    }

    /// Path of the durable message log file.
    pub fn messages_path(&self) -> PathBuf {
        self.data_dir.join("messages.jsonl")
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let cfg = ServerConfig::load(None, None, None).unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(cfg.users_path().ends_with("users.jsonl"));
        assert!(cfg.messages_path().ends_with("messages.jsonl"));
    }

    #[test]
    fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[server]\nport = 9000\ndata_dir = \"/var/lib/parley\"").unwrap();

        let cfg = ServerConfig::load(Some(&path), Some(9100), None).unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/parley"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg =
            ServerConfig::load(Some(Path::new("/nonexistent/config.toml")), None, None).unwrap();
        assert_eq!(cfg.port, 8080);
    }
}
