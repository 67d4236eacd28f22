use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub build_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Template subdirectory selecting the vendor syntax, e.g. "nxos"
    pub platform: String,
    pub template_ext: String,
    /// Connect/read timeout for device sessions; `None` waits indefinitely
    pub device_timeout_secs: Option<u64>,
    pub device: DeviceProfile,
}

/// Vendor command strings used by the SSH device access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub ssh_port: u16,
    pub fetch_command: String,
    pub config_enter: String,
    pub config_exit: String,
    pub save_command: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            ssh_port: 22,
            fetch_command: "show running-config".to_string(),
            config_enter: "configure terminal".to_string(),
            config_exit: "end".to_string(),
            save_command: "copy running-config startup-config".to_string(),
        }
    }
}

impl Config {
    /// Build a configuration with the default layout below `root`:
    /// `data/`, `templates/`, `build/` and `backups/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            templates_dir: root.join("templates"),
            build_dir: root.join("build"),
            backup_dir: root.join("backups"),
            root,
            platform: "nxos".to_string(),
            template_ext: "j2".to_string(),
            device_timeout_secs: None,
            device: DeviceProfile::default(),
        }
    }

    /// Load configuration from environment variables with defaults.
    /// `root_override` (the CLI `--root` flag) wins over `FABRIC_ROOT`.
    pub fn load(root_override: Option<&Path>) -> Self {
        let root = root_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(get_env("FABRIC_ROOT", ".")));
        let mut cfg = Self::with_root(root);

        if let Ok(dir) = env::var("FABRIC_DATA_DIR") {
            cfg.data_dir = cfg.root.join(dir);
        }
        if let Ok(dir) = env::var("FABRIC_TEMPLATES_DIR") {
            cfg.templates_dir = cfg.root.join(dir);
        }
        if let Ok(dir) = env::var("FABRIC_BUILD_DIR") {
            cfg.build_dir = cfg.root.join(dir);
        }
        if let Ok(dir) = env::var("FABRIC_BACKUP_DIR") {
            cfg.backup_dir = cfg.root.join(dir);
        }

        cfg.platform = get_env("FABRIC_PLATFORM", &cfg.platform);
        cfg.template_ext = get_env("FABRIC_TEMPLATE_EXT", &cfg.template_ext);
        cfg.device_timeout_secs = env::var("DEVICE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0);

        let defaults = DeviceProfile::default();
        cfg.device = DeviceProfile {
            ssh_port: get_env("DEVICE_SSH_PORT", "22").parse().unwrap_or(defaults.ssh_port),
            fetch_command: get_env("DEVICE_FETCH_COMMAND", &defaults.fetch_command),
            config_enter: get_env("DEVICE_CONFIG_ENTER", &defaults.config_enter),
            config_exit: get_env("DEVICE_CONFIG_EXIT", &defaults.config_exit),
            save_command: get_env("DEVICE_SAVE_COMMAND", &defaults.save_command),
        };

        cfg
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.data_dir.join("devices.yml")
    }

    pub fn fabric_path(&self) -> PathBuf {
        self.data_dir.join("fabric.yml")
    }

    pub fn vlans_path(&self) -> PathBuf {
        self.data_dir.join("vlans.csv")
    }
}

/// A string that never shows up in Debug or Display output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// SSH login for every device in the run, resolved once per process
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password),
        }
    }

    /// Read `DEVICE_SSH_USER` / `DEVICE_SSH_PASS`
    pub fn from_env() -> Result<Self> {
        let username = env::var("DEVICE_SSH_USER")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::not_found("credential", "DEVICE_SSH_USER"))?;
        let password = env::var("DEVICE_SSH_PASS")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::not_found("credential", "DEVICE_SSH_PASS"))?;
        Ok(Self::new(username, password))
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_layout() {
        let cfg = Config::with_root("/srv/fabric");
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/fabric/data"));
        assert_eq!(cfg.templates_dir, PathBuf::from("/srv/fabric/templates"));
        assert_eq!(cfg.build_dir, PathBuf::from("/srv/fabric/build"));
        assert_eq!(cfg.backup_dir, PathBuf::from("/srv/fabric/backups"));
        assert_eq!(cfg.inventory_path(), PathBuf::from("/srv/fabric/data/devices.yml"));
        assert_eq!(cfg.vlans_path(), PathBuf::from("/srv/fabric/data/vlans.csv"));
        assert_eq!(cfg.platform, "nxos");
        assert!(cfg.device_timeout_secs.is_none());
    }

    #[test]
    fn test_credentials_are_redacted() {
        let creds = Credentials::new("admin", "hunter2");
        let shown = format!("{:?}", creds);
        assert!(shown.contains("admin"));
        assert!(!shown.contains("hunter2"));
        assert_eq!(creds.password.to_string(), "****");
        assert_eq!(creds.password.expose(), "hunter2");
    }
}
