// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shelf configuration.
//!
//! Defaults:
//! - database_name: "shelf"
//! - debug_reset: false
//! - validate_schema_only: false
//!
//! [`ShelfConfig::from_env`] overlays `SHELF_DATABASE_NAME`,
//! `SHELF_DEBUG_RESET` and `SHELF_VALIDATE_ONLY`.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_DATABASE_NAME: &str = "SHELF_DATABASE_NAME";
pub const ENV_DEBUG_RESET: &str = "SHELF_DEBUG_RESET";
pub const ENV_VALIDATE_ONLY: &str = "SHELF_VALIDATE_ONLY";

/// Process-wide options for one [`Shelf`](crate::Shelf).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    /// Logical database the engine opens.
    pub database_name: String,
    /// Destroy and recreate the database on every open. Test/dev only: all
    /// stored data is lost.
    pub debug_reset: bool,
    /// Compile and register schemas without touching storage. Every record
    /// operation then fails with [`ShelfError::ValidationOnly`](crate::ShelfError::ValidationOnly).
    pub validate_schema_only: bool,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            database_name: "shelf".to_string(),
            debug_reset: false,
            validate_schema_only: false,
        }
    }
}

impl ShelfConfig {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    pub fn with_debug_reset(mut self, enabled: bool) -> Self {
        self.debug_reset = enabled;
        self
    }

    pub fn with_validate_schema_only(mut self, enabled: bool) -> Self {
        self.validate_schema_only = enabled;
        self
    }

    /// Defaults overlaid with the `SHELF_*` environment variables.
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup` (keyed by env var name).
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(name) = lookup(ENV_DATABASE_NAME).filter(|v| !v.trim().is_empty()) {
            config.database_name = name.trim().to_string();
        }
        if let Some(value) = lookup(ENV_DEBUG_RESET) {
            config.debug_reset = parse_flag(ENV_DEBUG_RESET, &value);
        }
        if let Some(value) = lookup(ENV_VALIDATE_ONLY) {
            config.validate_schema_only = parse_flag(ENV_VALIDATE_ONLY, &value);
        }
        config
    }
}

fn parse_flag(var: &str, value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "" | "0" | "false" | "no" | "off" => false,
        other => {
            warn!(var, value = other, "Unrecognised flag value, treating as false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ShelfConfig::default();
        assert_eq!(config.database_name, "shelf");
        assert!(!config.debug_reset);
        assert!(!config.validate_schema_only);
        assert_eq!(ShelfConfig::with_lookup(lookup(&[])), config);
    }

    #[test]
    fn test_env_overlay() {
        let config = ShelfConfig::with_lookup(lookup(&[
            (ENV_DATABASE_NAME, " inventory "),
            (ENV_DEBUG_RESET, "YES"),
            (ENV_VALIDATE_ONLY, "off"),
        ]));
        assert_eq!(config.database_name, "inventory");
        assert!(config.debug_reset);
        assert!(!config.validate_schema_only);
    }

    #[test]
    fn test_unrecognised_flag_is_false() {
        let config = ShelfConfig::with_lookup(lookup(&[(ENV_VALIDATE_ONLY, "maybe")]));
        assert!(!config.validate_schema_only);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ShelfConfig = serde_json::from_str(r#"{"debug_reset": true}"#).unwrap();
        assert_eq!(config, ShelfConfig::default().with_debug_reset(true));
    }
}
