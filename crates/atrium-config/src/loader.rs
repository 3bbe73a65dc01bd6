// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/atrium/atrium.toml`,
//! `$XDG_CONFIG_HOME/atrium/atrium.toml`, `./atrium.toml`, then `ATRIUM_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::AtriumConfig;

/// Sections addressable from the environment. `ATRIUM_ROUTING_IDLE_TIMEOUT_MINS`
/// maps to `routing.idle_timeout_mins`.
const ENV_SECTIONS: [&str; 8] = [
    "log",
    "server",
    "storage",
    "ingestion",
    "responder",
    "routing",
    "realtime",
    "scoring",
];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/atrium/atrium.toml";
pub(crate) const LOCAL_CONFIG: &str = "atrium.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("atrium").join("atrium.toml"))
        .unwrap_or_default()
}

/// Builds the full layered Figment without extracting it.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(AtriumConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Loads configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<AtriumConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from an inline TOML string over the defaults.
/// No files and no environment are consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<AtriumConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtriumConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AtriumConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtriumConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `ATRIUM_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Only the leading section name is split off so keys containing
/// underscores stay intact.
fn env_provider() -> Env {
    Env::prefixed("ATRIUM_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section) {
            if let Some(field) = rest.strip_prefix('_') {
                return format!("{section}.{field}");
            }
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            map_env_key("routing_idle_timeout_mins"),
            "routing.idle_timeout_mins"
        );
        assert_eq!(
            map_env_key("ingestion_verify_timeout_ms"),
            "ingestion.verify_timeout_ms"
        );
        assert_eq!(map_env_key("log_level"), "log.level");
        assert_eq!(map_env_key("unknown_key"), "unknown_key");
    }
}
