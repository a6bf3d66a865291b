// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::{GlobalConfig, ProjectFile};

/// Error surfaced when `strict_config` is set and a config file is malformed.
#[derive(Debug)]
pub struct ConfigError {
    pub path: PathBuf,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config error in {}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Path of the global config file.  `KODE_CONFIG_DIR` overrides the directory
/// (used by tests and sandboxed deployments).
pub fn global_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("KODE_CONFIG_DIR") {
        return PathBuf::from(dir).join("config.json");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/kode/config.json")
}

/// The config file to use: an explicit override (the `--config` flag) or the
/// default global path.
fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(global_config_path)
}

/// Load the global config, tolerating a missing or malformed file.
///
/// A parse error is logged and defaults are used; a corrupt config must
/// never prevent the assistant from starting.  Callers that honour
/// `strict_config` should use [`load_strict`] instead.
pub fn load_global_config() -> GlobalConfig {
    load_global_config_from(None)
}

/// Like [`load_global_config`] but reading from `explicit` when given
/// (the `--config` CLI flag).
pub fn load_global_config_from(explicit: Option<&Path>) -> GlobalConfig {
    let path = resolve_config_path(explicit);
    match read_config(&path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => GlobalConfig::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config parse failed; using defaults");
            GlobalConfig::default()
        }
    }
}

/// Like [`load_global_config`] but returns the parse error so strict-mode
/// callers can surface it to the user.
pub fn load_strict() -> Result<GlobalConfig, ConfigError> {
    load_strict_from(None)
}

/// Like [`load_strict`] but reading from `explicit` when given.
pub fn load_strict_from(explicit: Option<&Path>) -> Result<GlobalConfig, ConfigError> {
    let path = resolve_config_path(explicit);
    match read_config(&path) {
        Ok(Some(cfg)) => Ok(cfg),
        Ok(None) => Ok(GlobalConfig::default()),
        Err(e) => Err(ConfigError {
            path,
            message: e.to_string(),
        }),
    }
}

fn read_config(path: &Path) -> anyhow::Result<Option<GlobalConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading global config");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}

/// Persist the global config.  Whole-file write, last writer wins.
pub fn save_global_config(cfg: &GlobalConfig) -> anyhow::Result<()> {
    save_global_config_to(None, cfg)
}

/// Like [`save_global_config`] but writing to `explicit` when given, so a
/// session started with `--config` persists back to the same file.
pub fn save_global_config_to(explicit: Option<&Path>, cfg: &GlobalConfig) -> anyhow::Result<()> {
    let path = resolve_config_path(explicit);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(cfg).context("serialising config")?;
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Parse a project-scope file (`.kode.json` or `.mcprc`) from `dir`.
///
/// Returns `None` when the file does not exist; malformed files are logged
/// and treated as absent.
pub fn load_project_file(dir: &Path, file_name: &str) -> Option<ProjectFile> {
    let path = dir.join(file_name);
    if !path.is_file() {
        return None;
    }
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read project file");
            return None;
        }
    };
    // `.mcprc` files may be a bare server map rather than the nested
    // `.kode.json` shape; accept both.
    match serde_json::from_str::<ProjectFile>(&text) {
        Ok(f) if !f.mcp_servers.is_empty() => Some(f),
        _ => match serde_json::from_str(&text) {
            Ok(servers) => Some(ProjectFile {
                mcp_servers: servers,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "project file parse failed; ignoring");
                None
            }
        },
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// KODE_CONFIG_DIR is process-wide, so tests touching it must not run
    /// concurrently.
    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    /// Point KODE_CONFIG_DIR at a fresh temp dir for the duration of a test.
    struct ConfigDirGuard {
        _dir: tempfile::TempDir,
        _lock: MutexGuard<'static, ()>,
    }

    impl ConfigDirGuard {
        fn new() -> Self {
            let lock = env_lock().lock().unwrap_or_else(|e| e.into_inner());
            let dir = tempfile::tempdir().unwrap();
            std::env::set_var("KODE_CONFIG_DIR", dir.path());
            Self {
                _dir: dir,
                _lock: lock,
            }
        }
    }

    impl Drop for ConfigDirGuard {
        fn drop(&mut self) {
            std::env::remove_var("KODE_CONFIG_DIR");
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let _g = ConfigDirGuard::new();
        let cfg = load_global_config();
        assert_eq!(cfg.theme, "dark");
        assert_eq!(cfg.num_startups, 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let _g = ConfigDirGuard::new();
        let mut cfg = GlobalConfig::default();
        cfg.num_startups = 42;
        cfg.project_mut("/p").allowed_tools.push("read".into());
        save_global_config(&cfg).unwrap();

        let back = load_global_config();
        assert_eq!(back.num_startups, 42);
        assert_eq!(back.project("/p").allowed_tools, vec!["read".to_string()]);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let _g = ConfigDirGuard::new();
        let path = global_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        let cfg = load_global_config();
        assert_eq!(cfg.theme, "dark");
    }

    #[test]
    fn strict_mode_reports_malformed_file() {
        let _g = ConfigDirGuard::new();
        let path = global_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "]]").unwrap();
        let err = load_strict().unwrap_err();
        assert!(err.to_string().contains("config error"));
    }

    #[test]
    fn explicit_config_path_overrides_the_default() {
        let _g = ConfigDirGuard::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alt.json");
        std::fs::write(&path, r#"{"theme":"light","num_startups":9}"#).unwrap();

        let cfg = load_global_config_from(Some(&path));
        assert_eq!(cfg.theme, "light");
        assert_eq!(cfg.num_startups, 9);
        // The default location is untouched and still yields defaults.
        assert_eq!(load_global_config().theme, "dark");
    }

    #[test]
    fn save_to_explicit_path_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alt.json");
        let mut cfg = GlobalConfig::default();
        cfg.num_startups = 3;
        save_global_config_to(Some(&path), &cfg).unwrap();
        let back = load_global_config_from(Some(&path));
        assert_eq!(back.num_startups, 3);
    }

    #[test]
    fn strict_from_reports_malformed_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{oops").unwrap();
        assert!(load_strict_from(Some(&path)).is_err());
    }

    #[test]
    fn project_file_nested_shape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".kode.json"),
            r#"{"mcp_servers":{"a":{"type":"sse","url":"http://x/sse"}}}"#,
        )
        .unwrap();
        let f = load_project_file(dir.path(), ".kode.json").unwrap();
        assert!(f.mcp_servers.contains_key("a"));
    }

    #[test]
    fn mcprc_bare_map_shape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".mcprc"),
            r#"{"b":{"type":"stdio","command":"srv"}}"#,
        )
        .unwrap();
        let f = load_project_file(dir.path(), ".mcprc").unwrap();
        assert!(f.mcp_servers.contains_key("b"));
    }

    #[test]
    fn absent_project_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project_file(dir.path(), ".mcprc").is_none());
    }

    #[test]
    fn malformed_project_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".mcprc"), "oops").unwrap();
        assert!(load_project_file(dir.path(), ".mcprc").is_none());
    }
}
