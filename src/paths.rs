/// Centralized platform-specific path computation
///
/// Follows the XDG Base Directory specification on Unix-like systems.
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

/// Platform-agnostic path utilities
pub struct PlatformPaths;

const APP_DIR: &str = "semdex";

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share"))
                })
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Returns: {data_dir}/semdex
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Returns: {config_dir}/semdex
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Returns: {data_dir}/semdex/lancedb
    pub fn default_lancedb_path() -> PathBuf {
        Self::project_data_dir().join("lancedb")
    }

    /// Returns: {data_dir}/semdex/directories.json
    pub fn default_registry_path() -> PathBuf {
        Self::project_data_dir().join("directories.json")
    }

    /// Returns: {data_dir}/semdex/embedding_space.json
    pub fn default_space_path() -> PathBuf {
        Self::project_data_dir().join("embedding_space.json")
    }

    /// Returns: {data_dir}/semdex/writer.lock
    pub fn default_lock_path() -> PathBuf {
        Self::project_data_dir().join("writer.lock")
    }

    /// Returns: {config_dir}/semdex/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}

/// Turn a root directory into the prefix its descendants start with
pub fn dir_prefix(root: &str) -> String {
    if root.ends_with(MAIN_SEPARATOR) {
        root.to_string()
    } else {
        format!("{}{}", root, MAIN_SEPARATOR)
    }
}

/// True when `path` is `root` itself or lives somewhere below it
pub fn is_under(path: &str, root: &str) -> bool {
    let trimmed = root.trim_end_matches(MAIN_SEPARATOR);
    path == trimmed || path == root || path.starts_with(&dir_prefix(root))
}

/// Resolve a user-supplied path against the current directory without touching the filesystem
pub fn absolutize(path: &str) -> std::io::Result<String> {
    let p = Path::new(path);
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    // Drop "." and resolve ".." lexically
    let mut out = PathBuf::new();
    for component in abs.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out.to_string_lossy().to_string())
}
