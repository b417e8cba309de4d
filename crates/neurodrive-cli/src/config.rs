//! Configuration Vault – reads/writes `~/.neurodrive/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use neurodrive_runtime::EngineConfig;
use neurodrive_types::NeuroError;

/// Return the path to `~/.neurodrive/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".neurodrive").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<EngineConfig>, NeuroError> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Parse and validate the file at `path`, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<EngineConfig>, NeuroError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        NeuroError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg: EngineConfig = toml::from_str(&raw)
        .map_err(|e| NeuroError::Config(format!("failed to parse {}: {e}", path.display())))?;
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `NEURODRIVE_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `NEURODRIVE_VEHICLE_HOST` | `vehicle_host` |
/// | `NEURODRIVE_TELEMETRY_PORT` | `telemetry_port` |
/// | `NEURODRIVE_COMMAND_PORT` | `command_port` |
/// | `NEURODRIVE_VIDEO_PORT` | `video_port` |
/// | `NEURODRIVE_CALIBRATION_SECS` | `calibration_secs` |
pub fn apply_env_overrides(cfg: &mut EngineConfig) {
    if let Ok(v) = std::env::var("NEURODRIVE_VEHICLE_HOST")
        && !v.trim().is_empty()
    {
        cfg.vehicle_host = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("NEURODRIVE_TELEMETRY_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.telemetry_port = port;
    }
    if let Ok(v) = std::env::var("NEURODRIVE_COMMAND_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.command_port = port;
    }
    if let Ok(v) = std::env::var("NEURODRIVE_VIDEO_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.video_port = port;
    }
    if let Ok(v) = std::env::var("NEURODRIVE_CALIBRATION_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.calibration_secs = secs;
    }
}

/// Save the config to disk, creating `~/.neurodrive/` if necessary.
pub fn save(cfg: &EngineConfig) -> Result<(), NeuroError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &EngineConfig, path: &Path) -> Result<(), NeuroError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            NeuroError::Config(format!("failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                NeuroError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| NeuroError::Serialization(format!("config: {e}")))?;
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
            .map_err(|e| {
                NeuroError::Config(format!("failed to write {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| NeuroError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&EngineConfig::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.telemetry_port, 5005);
        assert_eq!(loaded.command_port, 5006);
        assert_eq!(loaded.video_port, 5007);
        assert_eq!(loaded.thresholds, EngineConfig::default().thresholds);
        assert_eq!(loaded.model.num_trees, 100);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&EngineConfig::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap())
            .expect("meta")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "vehicle_host = \"10.0.0.7\"\n[thresholds]\nrecovery_speed = 8.0\n")
            .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.vehicle_host, "10.0.0.7");
        assert_eq!(cfg.thresholds.recovery_speed, 8.0);
        assert_eq!(cfg.thresholds.rule_hysteresis, 3);
        assert_eq!(cfg.control_interval_ms, 30);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[model]\ncontamination = 0.9\n").expect("write");
        assert!(matches!(load_from(&path), Err(NeuroError::Config(_))));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "telemetry_port = \"not a number\"").expect("write");
        assert!(matches!(load_from(&path), Err(NeuroError::Config(_))));
    }

    #[test]
    fn config_path_points_to_neurodrive_dir() {
        let p = config_path_for_home("/home/driver");
        assert!(p.to_string_lossy().contains(".neurodrive"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // Each test below touches a distinct variable so they can run in parallel.

    #[test]
    fn env_overrides_telemetry_port() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("NEURODRIVE_TELEMETRY_PORT", "6005") };
        let mut cfg = EngineConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.telemetry_port, 6005);
        unsafe { std::env::remove_var("NEURODRIVE_TELEMETRY_PORT") };
    }

    #[test]
    fn env_overrides_ignore_invalid_port() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("NEURODRIVE_COMMAND_PORT", "not-a-port") };
        let mut cfg = EngineConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.command_port, 5006);
        unsafe { std::env::remove_var("NEURODRIVE_COMMAND_PORT") };
    }

    #[test]
    fn env_overrides_vehicle_host() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("NEURODRIVE_VEHICLE_HOST", "192.168.1.40") };
        let mut cfg = EngineConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.vehicle_host, "192.168.1.40");
        unsafe { std::env::remove_var("NEURODRIVE_VEHICLE_HOST") };
    }

    #[test]
    fn env_overrides_calibration_window() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var("NEURODRIVE_CALIBRATION_SECS", "3") };
        let mut cfg = EngineConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.calibration_secs, 3);
        unsafe { std::env::remove_var("NEURODRIVE_CALIBRATION_SECS") };
    }
}
