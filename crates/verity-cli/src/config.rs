//! Configuration Vault – reads/writes `~/.verity/config.toml`.
//!
//! The vault stores a [`CoreConfig`] verbatim, so every section of the file
//! (`[store]`, `[evaluator]`, `[planner]`) maps onto one core component.

use std::fs;
use std::path::{Path, PathBuf};

use verity_kernel::SafetyMode;
use verity_runtime::CoreConfig;

/// Return the path to `~/.verity/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".verity").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<CoreConfig>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the file at `path` as written, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<CoreConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: CoreConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `VERITY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VERITY_DB_PATH` | `store.db_path` (empty string selects in-memory) |
/// | `VERITY_SAFETY_MODE` | `evaluator.safety_mode` (`fail_closed` / `fail_open`) |
/// | `VERITY_MAX_EXPANSIONS` | `planner.max_expansions` |
/// | `VERITY_AUDIT_CAPACITY` | `evaluator.audit_capacity` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut CoreConfig) {
    if let Ok(v) = std::env::var("VERITY_DB_PATH") {
        cfg.store.db_path = if v.is_empty() { None } else { Some(v) };
    }
    if let Ok(v) = std::env::var("VERITY_SAFETY_MODE")
        && let Some(mode) = SafetyMode::parse(&v)
    {
        cfg.evaluator.safety_mode = mode;
    }
    if let Ok(v) = std::env::var("VERITY_MAX_EXPANSIONS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.planner.max_expansions = n;
    }
    if let Ok(v) = std::env::var("VERITY_AUDIT_CAPACITY")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.evaluator.audit_capacity = n;
    }
}

/// Save the config to disk, creating `~/.verity/` if necessary.
pub fn save(cfg: &CoreConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &CoreConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only (rwx------) on Unix; the ledger path may be private.
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

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&CoreConfig::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_preserves_every_section() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = CoreConfig::default();
        cfg.store.db_path = Some("/var/lib/verity/ledger.db".into());
        cfg.store.fold_threshold = 5;
        cfg.evaluator.safety_mode = SafetyMode::FailOpen;
        cfg.planner.base_cost = 2.5;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.store.db_path.as_deref(), Some("/var/lib/verity/ledger.db"));
        assert_eq!(loaded.store.fold_threshold, 5);
        assert_eq!(loaded.evaluator.safety_mode, SafetyMode::FailOpen);
        assert_eq!(loaded.planner.base_cost, 2.5);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[planner]\nbase_cost = 3.0\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.planner.base_cost, 3.0);
        assert_eq!(loaded.planner.max_expansions, 10_000);
        assert_eq!(loaded.store.embedding_dim, 256);
        assert_eq!(loaded.evaluator.safety_mode, SafetyMode::FailClosed);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[evaluator]\nsafety_mode = \"sometimes\"\n").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_verity_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".verity"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // All overrides are exercised in one test: env vars are process-global
    // and the test harness runs tests on parallel threads.
    #[test]
    fn apply_env_overrides_updates_fields() {
        // SAFETY: no other test in this crate touches VERITY_* variables.
        unsafe {
            std::env::set_var("VERITY_DB_PATH", "/tmp/robot.db");
            std::env::set_var("VERITY_SAFETY_MODE", "fail_open");
            std::env::set_var("VERITY_MAX_EXPANSIONS", "not-a-number");
            std::env::set_var("VERITY_AUDIT_CAPACITY", "7");
        }
        let mut cfg = CoreConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.store.db_path.as_deref(), Some("/tmp/robot.db"));
        assert_eq!(cfg.evaluator.safety_mode, SafetyMode::FailOpen);
        assert_eq!(cfg.planner.max_expansions, 10_000);
        assert_eq!(cfg.evaluator.audit_capacity, 7);

        unsafe { std::env::set_var("VERITY_DB_PATH", "") };
        apply_env_overrides(&mut cfg);
        assert!(cfg.store.db_path.is_none());

        unsafe {
            std::env::remove_var("VERITY_DB_PATH");
            std::env::remove_var("VERITY_SAFETY_MODE");
            std::env::remove_var("VERITY_MAX_EXPANSIONS");
            std::env::remove_var("VERITY_AUDIT_CAPACITY");
        }
    }
}
