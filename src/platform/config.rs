//! `callgen.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{
    BalancePolicy, CallgenError, CallgenResult, Target, TaskOptions, Verify, DEFAULT_BALANCE_HEADROOM,
    DEFAULT_MAX_TASK_PROGRAMS, DEFAULT_PRIORITY_LEVELS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Descriptor catalog (.json or .toml). The builtin catalog is used when unset.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Calls per generated program.
    #[serde(default = "default_target_length")]
    pub target_length: usize,

    /// Upper bound of the per-task batch size.
    #[serde(default = "default_max_task_programs")]
    pub max_task_programs: usize,

    /// Number of distinct program priorities.
    #[serde(default = "default_priority_levels")]
    pub priority_levels: u8,

    #[serde(default)]
    pub balance_policy: BalancePolicy,

    /// Calls the balancer may add past `target_length`.
    #[serde(default = "default_balance_headroom")]
    pub balance_headroom: usize,

    /// Worker threads per task batch.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Self-validation of generated programs.
    #[serde(default)]
    pub verify: Verify,

    /// Restrict generation to these descriptors. Empty means all.
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_target_length() -> usize {
    30
}

fn default_max_task_programs() -> usize {
    DEFAULT_MAX_TASK_PROGRAMS
}

fn default_priority_levels() -> u8 {
    DEFAULT_PRIORITY_LEVELS
}

fn default_balance_headroom() -> usize {
    DEFAULT_BALANCE_HEADROOM
}

fn default_jobs() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog: None,
            target_length: default_target_length(),
            max_task_programs: default_max_task_programs(),
            priority_levels: default_priority_levels(),
            balance_policy: BalancePolicy::default(),
            balance_headroom: default_balance_headroom(),
            jobs: default_jobs(),
            verify: Verify::default(),
            enabled: Vec::new(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Rejects settings generation cannot work with.
    pub fn validate(&self) -> CallgenResult<()> {
        if self.max_task_programs == 0 {
            return Err(CallgenError::Config("max_task_programs must be at least 1".to_string()));
        }
        if self.priority_levels == 0 {
            return Err(CallgenError::Config("priority_levels must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn load_target(&self) -> CallgenResult<Target> {
        match &self.catalog {
            Some(path) => Target::load(path),
            None => Ok(Target::builtin()),
        }
    }

    pub fn task_options(&self) -> TaskOptions {
        TaskOptions {
            max_programs: self.max_task_programs,
            priority_levels: self.priority_levels,
            balance_policy: self.balance_policy,
            balance_headroom: self.balance_headroom,
            jobs: self.jobs.max(1),
            verify: self.verify,
        }
    }
}
