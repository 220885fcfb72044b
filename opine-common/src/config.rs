//! Configuration loading and root folder resolution
//!
//! The root folder holds the shared `opine.db` database plus service-owned
//! subdirectories (e.g. the generation pipeline's media directory).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TOML configuration file contents (`~/.config/opine/<service>.toml`)
///
/// Every field is optional; the settings table and environment variables
/// take priority over TOML values (see service-level key resolution).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder override
    pub root_folder: Option<String>,
    /// OpenAI API key (text generation + embeddings)
    pub openai_api_key: Option<String>,
    /// Gemini API key (text + image generation)
    pub gemini_api_key: Option<String>,
    /// Shared secret for the scheduler trigger surface
    pub trigger_secret: Option<String>,
    /// Public base URL used to build object-store links
    pub public_base_url: Option<String>,
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_config: Option<&TomlConfig>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(config) = toml_config {
        if let Some(root_folder) = &config.root_folder {
            return PathBuf::from(root_folder);
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Ensure the root folder exists, creating it if missing
pub fn ensure_root_folder(root_folder: &PathBuf) -> Result<()> {
    std::fs::create_dir_all(root_folder)?;
    Ok(())
}

/// Path of the shared database inside the root folder
pub fn database_path(root_folder: &PathBuf) -> PathBuf {
    root_folder.join("opine.db")
}

/// Load the TOML configuration file for a service, if one exists
///
/// Looks for `<config_dir>/opine/<service>.toml` (e.g.
/// `~/.config/opine/opine-qg.toml` on Linux). A missing file is not an
/// error; a present-but-unparsable file is.
pub fn load_toml_config(service: &str) -> Result<Option<TomlConfig>> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(None);
    };

    let path = config_dir.join("opine").join(format!("{}.toml", service));
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    tracing::info!("Loaded TOML config: {}", path.display());
    Ok(Some(config))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/opine (or /var/lib/opine for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("opine"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/opine"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/opine
        dirs::data_dir()
            .map(|d| d.join("opine"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/opine"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\opine
        dirs::data_local_dir()
            .map(|d| d.join("opine"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\opine"))
    } else {
        PathBuf::from("./opine_data")
    }
}
