//! Platform-specific settings directory.
//!
//!   Windows: %APPDATA%/gespreksbot
//!   macOS:   ~/Library/Application Support/gespreksbot
//!   Linux:   $XDG_CONFIG_HOME/gespreksbot (default ~/.config/gespreksbot)

use std::path::PathBuf;

/// Directory holding the engine settings file.
pub fn settings_dir() -> PathBuf {
    config_base().join("gespreksbot")
}

fn config_base() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata);
        }
        dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("AppData")
                .join("Roaming")
        })
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Application Support")
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    }
}
