//! Configuration resolution for surya-audit
//!
//! Secrets with more than one source are resolved here, highest priority
//! first: Environment → TOML.

use surya_common::config::TomlConfig;
use tracing::{info, warn};

/// Environment variable holding the static-maps API key
pub const MAPS_API_KEY_ENV: &str = "SURYA_MAPS_API_KEY";

/// Resolve the static-maps API key, `None` when no source has a usable key
pub fn resolve_maps_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(MAPS_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .imagery
        .maps_api_key
        .clone()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Maps API key found in environment and TOML. Using {} (highest priority).",
            MAPS_API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("Maps API key loaded from environment variable");
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("Maps API key loaded from TOML config");
        return Some(key);
    }
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
