//! Reads and writes `~/.vsim/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vsim_runtime::BridgeConfig;
use vsim_runtime::bridge::DEFAULT_SUPPORTED_TRANSPORTS;

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name the transport reports; checked against `supported_transports`.
    #[serde(default = "default_transport_name")]
    pub transport_name: String,

    /// WebSocket port of the socket bridge.
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,

    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default = "default_topic_pacing_ms")]
    pub topic_pacing_ms: u64,

    #[serde(default = "default_service_settle_ms")]
    pub service_settle_ms: u64,

    /// TOML message catalog; method and topic types follow naming
    /// conventions when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,

    /// SQLite file mirroring the history; memory only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_db: Option<PathBuf>,

    /// Services started right after boot.
    #[serde(default)]
    pub autostart: Vec<String>,

    #[serde(default = "default_supported_transports")]
    pub supported_transports: Vec<String>,
}

fn default_transport_name() -> String {
    "ZENOH".to_string()
}
fn default_socket_port() -> u16 {
    8765
}
fn default_rpc_timeout_ms() -> u64 {
    15_000
}
fn default_topic_pacing_ms() -> u64 {
    500
}
fn default_service_settle_ms() -> u64 {
    1_000
}
fn default_supported_transports() -> Vec<String> {
    DEFAULT_SUPPORTED_TRANSPORTS.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport_name: default_transport_name(),
            socket_port: default_socket_port(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            topic_pacing_ms: default_topic_pacing_ms(),
            service_settle_ms: default_service_settle_ms(),
            schema_path: None,
            history_db: None,
            autostart: Vec::new(),
            supported_transports: default_supported_transports(),
        }
    }
}

impl Config {
    /// The runtime subset handed to the bridge.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            topic_pacing: Duration::from_millis(self.topic_pacing_ms),
            service_settle: Duration::from_millis(self.service_settle_ms),
            supported_transports: self.supported_transports.clone(),
        }
    }
}

/// Return the path to `~/.vsim/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vsim").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VSIM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VSIM_TRANSPORT` | `transport_name` |
/// | `VSIM_SOCKET_PORT` | `socket_port` |
/// | `VSIM_RPC_TIMEOUT_MS` | `rpc_timeout_ms` |
/// | `VSIM_TOPIC_PACING_MS` | `topic_pacing_ms` |
/// | `VSIM_SCHEMA_PATH` | `schema_path` |
/// | `VSIM_HISTORY_DB` | `history_db` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("VSIM_TRANSPORT") {
        cfg.transport_name = v;
    }
    if let Some(port) = lookup("VSIM_SOCKET_PORT").and_then(|v| v.parse().ok()) {
        cfg.socket_port = port;
    }
    if let Some(ms) = lookup("VSIM_RPC_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        cfg.rpc_timeout_ms = ms;
    }
    if let Some(ms) = lookup("VSIM_TOPIC_PACING_MS").and_then(|v| v.parse().ok()) {
        cfg.topic_pacing_ms = ms;
    }
    if let Some(v) = lookup("VSIM_SCHEMA_PATH") {
        cfg.schema_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("VSIM_HISTORY_DB") {
        cfg.history_db = Some(PathBuf::from(v));
    }
}

/// Save the config to disk, creating `~/.vsim/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_bridge_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.transport_name, "ZENOH");
        assert_eq!(cfg.socket_port, 8765);
        assert_eq!(cfg.bridge_config(), BridgeConfig::default());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.autostart = vec!["example.hello_world".to_string()];
        save_to(&cfg, &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read back");
        let loaded: Config = toml::from_str(&raw).expect("parse");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("socket_port = 9000\n").expect("parse");
        assert_eq!(cfg.socket_port, 9000);
        assert_eq!(cfg.rpc_timeout_ms, 15_000);
        assert!(cfg.schema_path.is_none());
        assert!(cfg.supported_transports.iter().any(|t| t == "SOMEIP"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_vsim_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.starts_with("/home/testuser/.vsim"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "socket_port = \"not a number\"").expect("write");
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn overrides_replace_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup_from(&[
                ("VSIM_TRANSPORT", "SOMEIP"),
                ("VSIM_SOCKET_PORT", "9001"),
                ("VSIM_RPC_TIMEOUT_MS", "2500"),
                ("VSIM_SCHEMA_PATH", "/etc/vsim/schema.toml"),
            ]),
        );
        assert_eq!(cfg.transport_name, "SOMEIP");
        assert_eq!(cfg.socket_port, 9001);
        assert_eq!(cfg.rpc_timeout_ms, 2500);
        assert_eq!(cfg.schema_path, Some(PathBuf::from("/etc/vsim/schema.toml")));
        assert_eq!(cfg.topic_pacing_ms, 500);
    }

    #[test]
    fn overrides_ignore_invalid_numbers() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            lookup_from(&[("VSIM_SOCKET_PORT", "not-a-port"), ("VSIM_TOPIC_PACING_MS", "-5")]),
        );
        assert_eq!(cfg.socket_port, 8765);
        assert_eq!(cfg.topic_pacing_ms, 500);
    }
}
