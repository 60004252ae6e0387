//! # convo-settings
//!
//! Configuration with layered sources for the convo client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ConvoSettings::default()`]
//! 2. **User file**: `~/.convo/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CONVO_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{convo_home, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<ConvoSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.convo/settings.json` with env var
/// overrides. If loading fails, the error is logged and compiled defaults
/// are used.
pub fn get_settings() -> &'static ConvoSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ConvoSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ConvoSettings) -> std::result::Result<(), ConvoSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = ConvoSettings::default();
        assert!(settings_path().ends_with(".convo/settings.json"));
    }
}
