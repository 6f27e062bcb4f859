use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::eyre, Result};
use dirs::config_dir;
use sandbox_router::{SandboxConfig, DEFAULT_MAX_BODY_SIZE};
use serde::{Deserialize, Serialize};

/// Server configuration loaded from `~/.config/iiif-sandbox/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Override for the file store root.
    pub data_dir: Option<PathBuf>,
    pub listen: SocketAddr,
    pub store: StoreKind,
    pub max_body_bytes: usize,
    /// Seconds between expired-object sweeps; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
    pub sandbox: SandboxConfig,
    pub converter: ConverterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            store: StoreKind::File,
            max_body_bytes: DEFAULT_MAX_BODY_SIZE,
            sweep_interval_secs: 300,
            sandbox: SandboxConfig::default(),
            converter: ConverterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// In-process Presentation 2/3 upgrader.
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConverterConfig {
    pub kind: ConverterKind,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.sandbox.validate()?;
        if self.max_body_bytes == 0 {
            return Err(eyre!("max_body_bytes must be greater than zero"));
        }
        if self.converter.kind == ConverterKind::Remote && self.converter.endpoint.is_none() {
            return Err(eyre!("converter.endpoint is required when converter.kind = \"remote\""));
        }
        Ok(())
    }
}

/// Config path from `--config`, else the platform default.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_path(),
    }
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| eyre!("no config dir available"))?;
    Ok(base.join("iiif-sandbox").join("config.toml"))
}

/// Write the given config to `path`, creating parent directories as needed.
/// Leaves an existing file untouched so user edits are never clobbered.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.listen.to_string(), "127.0.0.1:8787");
    }

    #[test]
    fn empty_file_means_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/sandbox-data"
            listen = "0.0.0.0:9000"
            store = "memory"
            max_body_bytes = 4096
            [sandbox]
            encryption = true
            rotate_update_token = false
            public_url = "https://preview.example.org"
            [converter]
            kind = "remote"
            endpoint = "http://converter.internal/convert"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/sandbox-data")),
                listen: "0.0.0.0:9000".parse().expect("addr"),
                store: StoreKind::Memory,
                max_body_bytes: 4096,
                sweep_interval_secs: 300,
                sandbox: SandboxConfig {
                    encryption: true,
                    rotate_update_token: false,
                    public_url: Some("https://preview.example.org".into()),
                    ..SandboxConfig::default()
                },
                converter: ConverterConfig {
                    kind: ConverterKind::Remote,
                    endpoint: Some("http://converter.internal/convert".into()),
                    timeout_secs: None,
                },
            }
        );
        cfg.validate().expect("valid");
    }

    #[test]
    fn remote_converter_needs_endpoint() {
        let cfg = Config {
            converter: ConverterConfig {
                kind: ConverterKind::Remote,
                ..ConverterConfig::default()
            },
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_surfaces_sandbox_errors() {
        let mut cfg = Config::default();
        cfg.sandbox.action_length = 0;
        let err = cfg.validate().expect_err("zero action length");
        assert!(err.to_string().contains("action_length"));
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/sandbox-data")),
            ..Config::default()
        };

        write_if_missing(&cfg, &path).expect("write should succeed");
        let second = write_if_missing(&Config::default(), &path).expect("second write ok");
        assert_eq!(second, path);
        let loaded = load_from_path(&path).expect("reload");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_path(Some(Path::new("/etc/sandbox.toml"))).expect("resolve");
        assert_eq!(path, PathBuf::from("/etc/sandbox.toml"));
    }
}
