//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `STEMSCRIBE_ROOT_FOLDER`
//! 3. TOML config file `root_folder`
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file never aborts startup: a warning is logged and defaults
//! are used. A file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "STEMSCRIBE_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "STEMSCRIBE_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "stemscribe.db";

/// Logging section shared by every TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Platform defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/stemscribe (or /var/lib/stemscribe for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("stemscribe"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/stemscribe"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("stemscribe"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/stemscribe"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("stemscribe"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\stemscribe"))
    } else {
        PathBuf::from("./stemscribe_data")
    }
}

/// Default config file path for a module: `<config dir>/stemscribe/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("stemscribe").join(format!("{}.toml", module_name)))
}

/// Resolves the root folder following the documented priority order
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self {
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Root folder given on the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Root folder read from the TOML config
    pub fn with_toml_root(mut self, path: Option<PathBuf>) -> Self {
        self.toml_root = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(root = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(root = %path, "Root folder from environment");
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            debug!(root = %path.display(), "Root folder from TOML config");
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

impl Default for RootFolderResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates the root folder on first start and derives paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            debug!(root = %self.root_folder.display(), "Created root folder");
        }
        if !self.root_folder.is_dir() {
            return Err(Error::Config(format!(
                "Root folder is not a directory: {}",
                self.root_folder.display()
            )));
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

/// Load a TOML config, falling back to `T::default()` when the file is missing
///
/// A file that exists but fails to parse is an error.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!(
            path = %path.display(),
            "Config file not found, using defaults"
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
