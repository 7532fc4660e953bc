use crate::error::{DistLockError, Result};
use crate::locking::hygiene::LockHygieneRunner;
use crate::locking::store::MAX_ID_CHARS;
use crate::locking::timeout::{
    LOCK_TIMEOUT_ENV, LockTimeoutResolution, LockTimeoutResolver, LockTimeoutValue,
};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DISTLOCK_HOME_ENV: &str = "DISTLOCK_HOME";

const ENV_PREFIX: &str = "DISTLOCK";
const DEFAULT_HOME_DIR: &str = ".distlock";
const DATABASE_FILE_NAME: &str = "locks.db";
const DEFAULT_HOLD_SECS: u64 = 60;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const FALLBACK_HOST: &str = "localhost";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DistLockConfig {
    #[serde(skip)]
    home: PathBuf,

    #[serde(default)]
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockingConfig {
    /// Database file; relative paths are resolved against the home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_hold_secs")]
    pub default_hold_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u64>,

    #[serde(default)]
    pub lock_wait_timeout: LockTimeoutValue,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_purge_on_start")]
    pub purge_on_start: bool,

    /// Unset means one default lease plus a minute, at least ten minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_grace_secs: Option<u64>,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            database: None,
            host: None,
            default_hold_secs: DEFAULT_HOLD_SECS,
            heartbeat_interval_secs: None,
            lock_wait_timeout: LockTimeoutValue::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            purge_on_start: true,
            purge_grace_secs: None,
        }
    }
}

fn default_hold_secs() -> u64 {
    DEFAULT_HOLD_SECS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_purge_on_start() -> bool {
    true
}

impl LockingConfig {
    pub fn default_hold(&self) -> Duration {
        Duration::from_secs(self.default_hold_secs)
    }

    /// Explicit interval, else a third of the default lease, never below one second.
    pub fn heartbeat_interval(&self) -> Duration {
        let secs = self
            .heartbeat_interval_secs
            .unwrap_or(self.default_hold_secs / 3)
            .max(1);
        Duration::from_secs(secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn purge_grace(&self) -> Duration {
        self.purge_grace_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| LockHygieneRunner::default_grace(self.default_hold()))
    }

    /// Host identity written to lock rows.
    pub fn host_name(&self) -> String {
        self.host
            .clone()
            .filter(|host| !host.trim().is_empty())
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| FALLBACK_HOST.to_string())
    }

    /// Picks the wait bound for deferred lock results: CLI, then
    /// `DISTLOCK_LOCK_TIMEOUT`, then the configured value.
    pub fn resolve_wait_timeout(&self, cli_override: Option<&str>) -> Result<LockTimeoutResolution> {
        let env_override = env::var(LOCK_TIMEOUT_ENV).ok();
        LockTimeoutResolver::new(
            cli_override,
            env_override.as_deref(),
            self.lock_wait_timeout,
            LockTimeoutValue::default(),
        )
        .resolve()
        .map_err(|err| DistLockError::InvalidConfig(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_hold_secs == 0 {
            return Err(DistLockError::InvalidConfig(
                "locking.default_hold_secs must be greater than zero".to_string(),
            ));
        }
        if let Some(interval) = self.heartbeat_interval_secs {
            if interval == 0 {
                return Err(DistLockError::InvalidConfig(
                    "locking.heartbeat_interval_secs must be greater than zero".to_string(),
                ));
            }
            if interval >= self.default_hold_secs {
                return Err(DistLockError::InvalidConfig(format!(
                    "locking.heartbeat_interval_secs ({interval}) must be shorter than \
                     locking.default_hold_secs ({})",
                    self.default_hold_secs
                )));
            }
        }
        if self
            .host
            .as_ref()
            .is_some_and(|host| host.chars().count() > MAX_ID_CHARS)
        {
            return Err(DistLockError::InvalidConfig(format!(
                "locking.host must be at most {MAX_ID_CHARS} characters"
            )));
        }
        Ok(())
    }
}

impl DistLockConfig {
    pub fn new(home: PathBuf) -> Self {
        Self {
            home,
            locking: LockingConfig::default(),
        }
    }

    /// Layers `config.toml` under `home` and `DISTLOCK_*` variables over the defaults.
    pub fn load(home: &Path) -> Result<Self> {
        let config_path = home.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            log::debug!("Loading config from {config_path:?}");
        } else {
            log::debug!("Config file not found at {config_path:?}, using defaults");
        }

        let settings = Config::builder()
            .add_source(
                File::from(config_path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DistLockError::ConfigError(format!("Failed to load config: {e}")))?;

        let mut config: DistLockConfig = settings
            .try_deserialize()
            .map_err(|e| DistLockError::ConfigError(format!("Failed to parse config: {e}")))?;
        config.home = home.to_path_buf();
        config.locking.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.home.join(CONFIG_FILE_NAME);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| DistLockError::ConfigError(format!("Failed to serialize config: {e}")))?;

        fs::write(&config_path, contents)?;
        log::debug!("Saved config to {config_path:?}");
        Ok(())
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.locking.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.home.join(path),
            None => self.home.join(DATABASE_FILE_NAME),
        }
    }
}

/// Resolves the home directory from `DISTLOCK_HOME`, else `~/.distlock`.
pub fn resolve_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os(DISTLOCK_HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    dirs::home_dir()
        .map(|dir| dir.join(DEFAULT_HOME_DIR))
        .ok_or_else(|| {
            DistLockError::ConfigError(format!(
                "Unable to determine home directory; set {DISTLOCK_HOME_ENV}"
            ))
        })
}

pub fn new_distlock_config() -> Result<DistLockConfig> {
    let home = resolve_home()?;
    DistLockConfig::load(&home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::timeout::LockTimeoutSource;
    use serial_test::serial;
    use tempfile::TempDir;

    struct EnvGuard {
        keys: Vec<&'static str>,
    }

    impl EnvGuard {
        fn set(pairs: &[(&'static str, &str)]) -> Self {
            for (key, value) in pairs {
                unsafe { env::set_var(key, value) };
            }
            Self {
                keys: pairs.iter().map(|(key, _)| *key).collect(),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in &self.keys {
                unsafe { env::remove_var(key) };
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = LockingConfig::default();
        assert_eq!(config.default_hold(), Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(20));
        assert_eq!(config.lock_wait_timeout, LockTimeoutValue::from_secs(30));
        assert_eq!(config.busy_timeout(), Duration::from_millis(5000));
        assert!(config.purge_on_start);
        assert_eq!(config.purge_grace(), Duration::from_secs(600));
    }

    #[test]
    fn test_purge_grace_follows_lease() {
        let long_lease = LockingConfig {
            default_hold_secs: 3600,
            ..LockingConfig::default()
        };
        assert_eq!(long_lease.purge_grace(), Duration::from_secs(3660));

        let explicit = LockingConfig {
            default_hold_secs: 3600,
            purge_grace_secs: Some(30),
            ..LockingConfig::default()
        };
        assert_eq!(explicit.purge_grace(), Duration::from_secs(30));
    }

    #[test]
    fn test_heartbeat_interval_floor() {
        let config = LockingConfig {
            default_hold_secs: 2,
            ..LockingConfig::default()
        };
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = DistLockConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.locking, LockingConfig::default());
        assert_eq!(config.home(), temp_dir.path());
        assert_eq!(config.database_path(), temp_dir.path().join("locks.db"));
    }

    #[test]
    #[serial]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = DistLockConfig::new(temp_dir.path().to_path_buf());
        config.locking.default_hold_secs = 90;
        config.locking.host = Some("worker-7".to_string());
        config.locking.lock_wait_timeout = LockTimeoutValue::Infinite;
        config.save().unwrap();

        let loaded = DistLockConfig::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.locking.default_hold_secs, 90);
        assert_eq!(loaded.locking.host_name(), "worker-7");
        assert_eq!(loaded.locking.lock_wait_timeout, LockTimeoutValue::Infinite);
    }

    #[test]
    #[serial]
    fn test_config_with_locking_section() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            r#"
[locking]
database = "shared/locks.sqlite"
heartbeat_interval_secs = 5
lock_wait_timeout = "infinite"
purge_on_start = false
"#,
        )
        .unwrap();

        let loaded = DistLockConfig::load(temp_dir.path()).unwrap();
        assert_eq!(
            loaded.database_path(),
            temp_dir.path().join("shared/locks.sqlite")
        );
        assert_eq!(loaded.locking.heartbeat_interval(), Duration::from_secs(5));
        assert!(loaded.locking.lock_wait_timeout.is_infinite());
        assert!(!loaded.locking.purge_on_start);
        assert_eq!(loaded.locking.default_hold_secs, DEFAULT_HOLD_SECS);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[locking]\ndefault_hold_secs = 120\n",
        )
        .unwrap();
        let _env = EnvGuard::set(&[("DISTLOCK_LOCKING__DEFAULT_HOLD_SECS", "45")]);

        let loaded = DistLockConfig::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.locking.default_hold_secs, 45);
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[locking]\ndefault_hold_secs = 10\nheartbeat_interval_secs = 10\n",
        )
        .unwrap();
        assert!(matches!(
            DistLockConfig::load(temp_dir.path()),
            Err(DistLockError::InvalidConfig(_))
        ));

        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[locking]\nlock_wait_timeout = \"soon\"\n",
        )
        .unwrap();
        assert!(matches!(
            DistLockConfig::load(temp_dir.path()),
            Err(DistLockError::ConfigError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_wait_timeout_precedence() {
        let config = LockingConfig {
            lock_wait_timeout: LockTimeoutValue::from_secs(12),
            ..LockingConfig::default()
        };

        let resolved = config.resolve_wait_timeout(None).unwrap();
        assert_eq!(resolved.value, LockTimeoutValue::from_secs(12));
        assert_eq!(resolved.source, LockTimeoutSource::Config);

        let _env = EnvGuard::set(&[(LOCK_TIMEOUT_ENV, "7")]);
        let resolved = config.resolve_wait_timeout(None).unwrap();
        assert_eq!(resolved.value, LockTimeoutValue::from_secs(7));
        assert_eq!(resolved.source, LockTimeoutSource::Environment);

        let resolved = config.resolve_wait_timeout(Some("infinite")).unwrap();
        assert!(resolved.value.is_infinite());
        assert_eq!(resolved.source, LockTimeoutSource::Cli);

        assert!(config.resolve_wait_timeout(Some("later")).is_err());
    }

    #[test]
    #[serial]
    fn test_resolve_home_prefers_environment() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_string_lossy().to_string();
        let _env = EnvGuard::set(&[(DISTLOCK_HOME_ENV, path.as_str())]);
        assert_eq!(resolve_home().unwrap(), temp_dir.path());
    }
}
