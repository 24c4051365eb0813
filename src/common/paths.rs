//! Configuration paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/navtest/`
//! - macOS: `~/Library/Application Support/navtest/`
//! - Windows: `%APPDATA%\navtest\`

use std::io;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "navtest";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Ensure the parent directory of a file exists
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_resolve_relative() {
        let base = Path::new("/plans");
        assert_eq!(
            resolve_relative(base, Path::new("scripts")),
            PathBuf::from("/plans/scripts")
        );
        assert_eq!(
            resolve_relative(base, Path::new("/opt/scripts")),
            PathBuf::from("/opt/scripts")
        );
    }
}
