//! Configuration Vault – reads/writes `~/.sitl/config.toml`.

use serde::{Deserialize, Serialize};
use sitl_transport::RetryPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted link settings stored in `~/.sitl/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Simulator host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Simulator TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Pause between refused connect attempts.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Give up connecting after this many attempts.  Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connect_attempts: Option<u32>,

    /// Give up connecting after this long.  Unset waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_deadline_ms: Option<u64>,

    /// Budget for a send that stays blocked.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Input and echo buffer size in bytes.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// End the process when the simulator goes away.
    #[serde(default = "default_exit_on_disconnect")]
    pub exit_on_disconnect: bool,

    /// Pause between firmware loop iterations.
    #[serde(default = "default_loop_period_ms")]
    pub loop_period_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5555
}
fn default_retry_interval_ms() -> u64 {
    500
}
fn default_write_timeout_ms() -> u64 {
    2000
}
fn default_buffer_capacity() -> usize {
    sitl_stream::DEFAULT_CAPACITY
}
fn default_exit_on_disconnect() -> bool {
    true
}
fn default_loop_period_ms() -> u64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            retry_interval_ms: default_retry_interval_ms(),
            max_connect_attempts: None,
            connect_deadline_ms: None,
            write_timeout_ms: default_write_timeout_ms(),
            buffer_capacity: default_buffer_capacity(),
            exit_on_disconnect: default_exit_on_disconnect(),
            loop_period_ms: default_loop_period_ms(),
        }
    }
}

impl Config {
    /// Connect and write bounds for the transport.
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default()
            .with_interval(Duration::from_millis(self.retry_interval_ms))
            .with_write_timeout(Duration::from_millis(self.write_timeout_ms));
        if let Some(attempts) = self.max_connect_attempts {
            policy = policy.with_max_attempts(attempts);
        }
        if let Some(ms) = self.connect_deadline_ms {
            policy = policy.with_deadline(Duration::from_millis(ms));
        }
        policy
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_capacity == 0 {
            return Err("buffer_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Override `host`/`port` from a `host:port` argument.
    pub fn apply_target(&mut self, arg: &str) -> Result<(), String> {
        let (host, port) = parse_target(arg)?;
        self.host = host;
        self.port = port;
        Ok(())
    }
}

/// Settings for one run of the link.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// File values, then `SITL_*` overrides, then the target argument.
    pub effective: Config,
    /// File values and the target argument only.  This is what
    /// `--save-config` writes.
    pub persisted: Config,
}

/// Combine the file config with the environment and an optional `host:port`
/// argument, validating the result.
pub fn resolve(file: Config, target: Option<&str>) -> Result<Resolved, String> {
    let mut persisted = file;
    if let Some(arg) = target {
        persisted.apply_target(arg)?;
    }
    let mut effective = persisted.clone();
    apply_env_overrides(&mut effective);
    if let Some(arg) = target {
        effective.apply_target(arg)?;
    }
    effective.validate()?;
    Ok(Resolved {
        effective,
        persisted,
    })
}

/// Split `host:port`.  The last colon separates the port so bracketed IPv6
/// literals (`[::1]:5555`) work; the brackets are stripped.
pub fn parse_target(arg: &str) -> Result<(String, u16), String> {
    let (host, port) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("Expected host:port, got '{}'", arg))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(format!("Missing host in '{}'", arg));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("Invalid port '{}': {}", port, e))?;
    Ok((host.to_string(), port))
}

/// Return the path to `~/.sitl/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sitl").join("config.toml")
}

/// Load the config file as written.  Returns `None` if it does not exist.
/// Environment overrides are applied by [`resolve`].
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Parse the file at `path` as-is.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `SITL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SITL_HOST` | `host` |
/// | `SITL_PORT` | `port` |
/// | `SITL_RETRY_INTERVAL_MS` | `retry_interval_ms` |
/// | `SITL_MAX_CONNECT_ATTEMPTS` | `max_connect_attempts` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SITL_HOST")
        && !v.is_empty()
    {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("SITL_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("SITL_RETRY_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.retry_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("SITL_MAX_CONNECT_ATTEMPTS")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.max_connect_attempts = Some(n);
    }
}

/// Save the config to disk, creating `~/.sitl/` if necessary.
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
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
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

    #[test]
    fn defaults_match_firmware_expectations() {
        let cfg = Config::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 5555);
        assert_eq!(cfg.buffer_capacity, 1000);
        assert!(cfg.exit_on_disconnect);
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn retry_policy_carries_bounds() {
        let cfg = Config {
            retry_interval_ms: 100,
            max_connect_attempts: Some(4),
            connect_deadline_ms: Some(3000),
            write_timeout_ms: 50,
            ..Config::default()
        };
        let policy = cfg.retry_policy();
        assert_eq!(policy.interval, Duration::from_millis(100));
        assert_eq!(policy.max_attempts, Some(4));
        assert_eq!(policy.deadline, Some(Duration::from_secs(3)));
        assert_eq!(policy.write_timeout, Duration::from_millis(50));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_custom_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = Config {
            host: "sim.local".to_string(),
            port: 6000,
            max_connect_attempts: Some(10),
            exit_on_disconnect: false,
            ..Config::default()
        };

        save_to(&cfg, &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 7000\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded.port, 7000);
        assert_eq!(loaded.host, "127.0.0.1");
        assert_eq!(loaded.connect_deadline_ms, None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"\n").expect("write");

        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_sitl_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.sitl/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_host() {
        // SAFETY: only this test touches SITL_HOST.
        unsafe { std::env::set_var("SITL_HOST", "10.0.0.7") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.host, "10.0.0.7");
        unsafe { std::env::remove_var("SITL_HOST") };
    }

    #[test]
    fn apply_env_overrides_changes_port_and_ignores_garbage() {
        // SAFETY: only this test touches SITL_PORT.
        unsafe { std::env::set_var("SITL_PORT", "6001") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 6001);

        unsafe { std::env::set_var("SITL_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 5555);
        unsafe { std::env::remove_var("SITL_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_retry_settings() {
        // SAFETY: only this test touches these variables.
        unsafe {
            std::env::set_var("SITL_RETRY_INTERVAL_MS", "250");
            std::env::set_var("SITL_MAX_CONNECT_ATTEMPTS", "3");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.retry_interval_ms, 250);
        assert_eq!(cfg.max_connect_attempts, Some(3));

        let resolved = resolve(Config::default(), Some("sim.local:6000")).unwrap();
        assert_eq!(resolved.effective.retry_interval_ms, 250);
        assert_eq!(resolved.effective.max_connect_attempts, Some(3));
        assert_eq!(resolved.persisted.retry_interval_ms, 500);
        assert_eq!(resolved.persisted.max_connect_attempts, None);
        assert_eq!(resolved.persisted.host, "sim.local");
        assert_eq!(resolved.persisted.port, 6000);
        assert_eq!(resolved.effective.host, "sim.local");
        unsafe {
            std::env::remove_var("SITL_RETRY_INTERVAL_MS");
            std::env::remove_var("SITL_MAX_CONNECT_ATTEMPTS");
        }
    }

    #[test]
    fn parse_target_accepts_host_port() {
        assert_eq!(
            parse_target("localhost:5760").unwrap(),
            ("localhost".to_string(), 5760)
        );
        assert_eq!(parse_target("[::1]:5555").unwrap(), ("::1".to_string(), 5555));
    }

    #[test]
    fn parse_target_rejects_bad_input() {
        assert!(parse_target("localhost").is_err());
        assert!(parse_target(":5555").is_err());
        assert!(parse_target("localhost:99999").is_err());
    }

    #[test]
    fn zero_buffer_capacity_is_rejected() {
        let cfg = Config {
            buffer_capacity: 0,
            ..Config::default()
        };
        assert!(cfg.validate().unwrap_err().contains("buffer_capacity"));
        assert!(resolve(cfg, None).is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_buffer_capacity_in_file_fails_resolve() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "buffer_capacity = 0\n").expect("write");

        let file = load_from(&path).expect("load ok").expect("some");
        let err = resolve(file, None).unwrap_err();
        assert!(err.contains("buffer_capacity"));
    }

    #[test]
    fn resolve_rejects_bad_target() {
        assert!(resolve(Config::default(), Some("no-port")).is_err());
    }

    #[test]
    fn apply_target_overrides_both_fields() {
        let mut cfg = Config::default();
        cfg.apply_target("192.168.1.20:6100").unwrap();
        assert_eq!(cfg.host, "192.168.1.20");
        assert_eq!(cfg.port, 6100);
    }
}
