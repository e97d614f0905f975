// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order, later wins: compiled defaults, `/etc/paydesk/paydesk.toml`,
//! `$XDG_CONFIG_HOME/paydesk/paydesk.toml`, `./paydesk.toml`, then `PAYDESK_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::PaydeskConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/paydesk/paydesk.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "paydesk.toml";

/// Top-level sections, used to split `PAYDESK_SECTION_KEY` env vars.
const SECTIONS: &[&str] = &[
    "worker",
    "storage",
    "media",
    "gemini",
    "bridge",
    "conversation",
    "allocation",
];

/// Path of the per-user config file, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("paydesk").join("paydesk.toml"))
}

/// Every file the standard lookup reads, lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    paths.extend(user_config_path());
    paths.push(PathBuf::from(LOCAL_CONFIG_PATH));
    paths
}

/// Build the standard figment without extracting it.
pub fn build_figment() -> Figment {
    config_file_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(PaydeskConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Load configuration from the standard file hierarchy with env overrides.
pub fn load_config() -> Result<PaydeskConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from one explicit file, still honoring env overrides.
pub fn load_config_from_path(path: &Path) -> Result<PaydeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PaydeskConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML string. No env overrides.
pub fn load_config_from_str(toml_content: &str) -> Result<PaydeskConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PaydeskConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// `PAYDESK_WORKER_LOG_LEVEL` maps to `worker.log_level`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// key names keep their own underscores.
fn env_provider() -> Env {
    Env::prefixed("PAYDESK_").map(|key| env_key_to_path(key.as_str()).into())
}

fn env_key_to_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
