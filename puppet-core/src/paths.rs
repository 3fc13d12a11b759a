// ABOUTME: XDG Base Directory paths for cross-platform config and data storage
// ABOUTME: Provides standardized paths for the config file and the raw payload cache

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "puppet";
const APPLICATION: &str = "puppet-gitter";

/// Get XDG-compliant directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the config directory path (e.g., ~/.config/puppet-gitter/)
/// Falls back to current directory if XDG directories unavailable
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default config file path
/// e.g., ~/.config/puppet-gitter/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Root of the raw payload cache; namespaces nest below it.
/// Lives in the per-user config directory.
pub fn cache_root() -> PathBuf {
    config_dir()
}
