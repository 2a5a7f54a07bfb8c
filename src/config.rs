// SPDX-License-Identifier: MIT

//! Runtime configuration from the environment
//!
//! `.env` is loaded first through dotenv; every setting has a default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::edit::EditLoopConfig;
use crate::error::ConfigError;
use crate::workflow::checkpoint::RetryPolicy;
use crate::workflow::engine::DEFAULT_MAX_STEPS;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root for checkpoints, sessions, audit logs and artifacts
    pub data_dir: PathBuf,
    pub patch_threshold: f64,
    pub max_patch_failures: u32,
    pub max_autonomous_edits: u32,
    pub max_steps: u32,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let edit = EditLoopConfig::default();
        Self {
            data_dir: PathBuf::from(".studyflow"),
            patch_threshold: edit.threshold,
            max_patch_failures: edit.max_consecutive_failures,
            max_autonomous_edits: edit.max_autonomous_edits,
            max_steps: DEFAULT_MAX_STEPS,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Read `STUDYFLOW_*` variables, after loading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "STUDYFLOW_STORE_RETRIES", defaults.retry.max_retries)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "STUDYFLOW_RETRY_BASE_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "STUDYFLOW_RETRY_MAX_MS",
                defaults.retry.max_delay.as_millis() as u64,
            )?),
        };

        let config = Self {
            data_dir: lookup("STUDYFLOW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            patch_threshold: parse_or(&lookup, "STUDYFLOW_PATCH_THRESHOLD", defaults.patch_threshold)?,
            max_patch_failures: parse_or(
                &lookup,
                "STUDYFLOW_MAX_PATCH_FAILURES",
                defaults.max_patch_failures,
            )?,
            max_autonomous_edits: parse_or(
                &lookup,
                "STUDYFLOW_MAX_AUTONOMOUS_EDITS",
                defaults.max_autonomous_edits,
            )?,
            max_steps: parse_or(&lookup, "STUDYFLOW_MAX_STEPS", defaults.max_steps)?,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.patch_threshold) {
            return Err(invalid("STUDYFLOW_PATCH_THRESHOLD", "must be between 0 and 1"));
        }
        if self.max_patch_failures == 0 {
            return Err(invalid("STUDYFLOW_MAX_PATCH_FAILURES", "must be at least 1"));
        }
        if self.max_autonomous_edits == 0 {
            return Err(invalid("STUDYFLOW_MAX_AUTONOMOUS_EDITS", "must be at least 1"));
        }
        if self.max_steps == 0 {
            return Err(invalid("STUDYFLOW_MAX_STEPS", "must be at least 1"));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(invalid(
                "STUDYFLOW_RETRY_BASE_MS",
                "must not exceed STUDYFLOW_RETRY_MAX_MS",
            ));
        }
        Ok(())
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    pub fn sessions_file(&self) -> PathBuf {
        self.data_dir.join("sessions.json")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join("audit")
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Edit loop settings derived from this configuration
    pub fn edit_loop(&self) -> EditLoopConfig {
        EditLoopConfig {
            threshold: self.patch_threshold,
            max_consecutive_failures: self.max_patch_failures,
            max_autonomous_edits: self.max_autonomous_edits,
            ..EditLoopConfig::default()
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, format!("'{}': {}", raw, e))),
    }
}
