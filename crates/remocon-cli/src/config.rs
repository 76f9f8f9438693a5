//! Configuration vault – reads/writes `~/.remocon/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.remocon/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// rosbridge WebSocket URL of the concert master.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    /// Concert name; the concert namespace is `/<concert_name>`.
    #[serde(default = "default_concert_name")]
    pub concert_name: String,

    /// Namespace of the app manager.  Relative names are resolved under the
    /// concert namespace; empty means the concert namespace itself.
    #[serde(default)]
    pub app_namespace: String,

    /// App started by `remocon start` when no app is named.
    #[serde(default)]
    pub default_app_name: String,

    /// How long to wait for a service response before giving up.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}
fn default_concert_name() -> String {
    "concert".to_string()
}
fn default_call_timeout_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rosbridge_url: default_rosbridge_url(),
            concert_name: default_concert_name(),
            app_namespace: String::new(),
            default_app_name: String::new(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// Return the path to `~/.remocon/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".remocon").join("config.toml")
}

/// Load the config from disk, falling back to defaults when the file does
/// not exist.  Environment overrides are applied in both cases.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `REMOCON_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REMOCON_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `REMOCON_CONCERT_NAME` | `concert_name` |
/// | `REMOCON_APP_NAMESPACE` | `app_namespace` |
/// | `REMOCON_CALL_TIMEOUT_SECS` | `call_timeout_secs` |
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("REMOCON_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
    if let Some(v) = lookup("REMOCON_CONCERT_NAME") {
        cfg.concert_name = v;
    }
    if let Some(v) = lookup("REMOCON_APP_NAMESPACE") {
        cfg.app_namespace = v;
    }
    if let Some(v) = lookup("REMOCON_CALL_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>() {
            cfg.call_timeout_secs = secs;
        }
}

/// Save the config to disk, creating `~/.remocon/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
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

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.rosbridge_url, "ws://localhost:9090");
        assert_eq!(cfg.concert_name, "concert");
        assert!(cfg.app_namespace.is_empty());
        assert!(cfg.default_app_name.is_empty());
        assert_eq!(cfg.call_timeout_secs, 10);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            concert_name: "office".to_string(),
            default_app_name: "turtlebot_teleop".to_string(),
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "concert_name = \"lab\"\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.concert_name, "lab");
        assert_eq!(loaded.rosbridge_url, "ws://localhost:9090");
        assert_eq!(loaded.call_timeout_secs, 10);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "call_timeout_secs = \"soon\"\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_remocon_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".remocon"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn overrides_replace_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            overrides(&[
                ("REMOCON_ROSBRIDGE_URL", "ws://robot-host:9090"),
                ("REMOCON_CONCERT_NAME", "office"),
                ("REMOCON_APP_NAMESPACE", "turtlebot"),
                ("REMOCON_CALL_TIMEOUT_SECS", "3"),
            ]),
        );
        assert_eq!(cfg.rosbridge_url, "ws://robot-host:9090");
        assert_eq!(cfg.concert_name, "office");
        assert_eq!(cfg.app_namespace, "turtlebot");
        assert_eq!(cfg.call_timeout_secs, 3);
    }

    #[test]
    fn overrides_ignore_invalid_timeout() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, overrides(&[("REMOCON_CALL_TIMEOUT_SECS", "never")]));
        assert_eq!(cfg.call_timeout_secs, 10);
    }

    #[test]
    fn no_overrides_leave_config_untouched() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, overrides(&[]));
        assert_eq!(cfg, Config::default());
    }
}
