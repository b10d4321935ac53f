//! Generator configuration.
//!
//! Precedence, lowest to highest: built-in defaults, an optional YAML file,
//! `FUZZLOG_*` environment variables, then whatever the caller sets on the
//! returned struct (CLI flags).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FuzzlogError;

pub const ENV_IDENTIFIER: &str = "FUZZLOG_IDENTIFIER";
pub const ENV_VM_ROLL: &str = "FUZZLOG_VM_ROLL";
pub const ENV_VM_TIME: &str = "FUZZLOG_VM_TIME";
pub const ENV_VM_PRANK: &str = "FUZZLOG_VM_PRANK";

/// Which environment-mutation cheatcodes accompany reconstructed calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// `vm.roll` for block advances.
    pub roll: bool,
    /// `vm.warp` for time advances.
    pub time: bool,
    /// `vm.prank` for the calling address.
    pub prank: bool,
}

impl VmOptions {
    #[must_use]
    pub fn all() -> Self {
        Self {
            roll: true,
            time: true,
            prank: true,
        }
    }

    #[must_use]
    pub fn any(self) -> bool {
        self.roll || self.time || self.prank
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Suffix used in every generated function name (branch, job, run id).
    pub identifier: String,
    pub vm: VmOptions,
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(bad) = self
            .identifier
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_'))
        {
            return Err(format!(
                "identifier may only contain [A-Za-z0-9_], found {bad:?} in {:?}",
                self.identifier
            ));
        }
        Ok(())
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, FuzzlogError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
            .map_err(|err| FuzzlogError::config(format!("parse config: {err}")))
    }

    /// Override fields from `FUZZLOG_*` variables looked up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(identifier) = lookup(ENV_IDENTIFIER) {
            if !identifier.trim().is_empty() {
                self.identifier = identifier.trim().to_string();
            }
        }
        if let Some(flag) = lookup(ENV_VM_ROLL).as_deref().and_then(parse_env_bool) {
            self.vm.roll = flag;
        }
        if let Some(flag) = lookup(ENV_VM_TIME).as_deref().and_then(parse_env_bool) {
            self.vm.time = flag;
        }
        if let Some(flag) = lookup(ENV_VM_PRANK).as_deref().and_then(parse_env_bool) {
            self.vm.prank = flag;
        }
    }
}

/// Load config: defaults < file < environment. An explicit path that
/// cannot be read is a hard error; a missing default file is not.
pub fn load_config(
    explicit: Option<&Path>,
) -> Result<(GeneratorConfig, Option<PathBuf>), FuzzlogError> {
    let mut cfg = GeneratorConfig::default();
    let mut used = None;

    let candidate = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };
    if let Some(path) = candidate {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                cfg = GeneratorConfig::from_yaml_str(&text)?;
                used = Some(path);
            }
            Err(err) => {
                if explicit.is_some() {
                    return Err(FuzzlogError::config(format!(
                        "failed to load config file {}: {err}",
                        path.display()
                    )));
                }
            }
        }
    }

    cfg.apply_env_overrides(|key| std::env::var(key).ok());
    cfg.validate().map_err(FuzzlogError::Config)?;
    Ok((cfg, used))
}

/// `./fuzzlog.yaml`, then `$XDG_CONFIG_HOME/fuzzlog/config.yaml`, then
/// `~/.config/fuzzlog/config.yaml`.
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from("fuzzlog.yaml")];
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            candidates.push(PathBuf::from(xdg).join("fuzzlog").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            candidates.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("fuzzlog")
                    .join("config.yaml"),
            );
        }
    }
    candidates.into_iter().find(|path| path.is_file())
}

fn parse_env_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
