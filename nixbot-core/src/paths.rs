// ABOUTME: Default on-disk locations: the state directory, the rolling log dir and config search order
// ABOUTME: NIXBOT_STATE_DIR overrides the platform data dir; a relative ./state is the last resort

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Env var that relocates the whole state directory (Matrix store, bindings, logs)
pub const STATE_DIR_ENV: &str = "NIXBOT_STATE_DIR";
/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "NIXBOT_CONFIG_PATH";
pub const CONFIG_FILE_NAME: &str = "config.toml";

fn platform_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "nixbot", "nixbot")
}

/// State directory used when the config file does not name one,
/// e.g. ~/.local/share/nixbot on Linux
pub fn default_state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    platform_dirs()
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./state"))
}

/// Daily-rotated log files live under the state directory
pub fn log_dir() -> PathBuf {
    log_dir_in(&default_state_dir())
}

pub fn log_dir_in(state_dir: &Path) -> PathBuf {
    state_dir.join("logs")
}

/// Config files to try, most specific first: the env var, the working
/// directory, then the per-user config dir.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(explicit) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(explicit));
    }
    candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Some(dirs) = platform_dirs() {
        candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    candidates
}

/// First candidate that exists on disk
pub fn find_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|p| p.is_file())
}
