//! Application configuration management.
//!
//! Holds the Canvas course and assignment to grade, where the two input
//! sheets live, and the tuning knobs for submission.
//!
//! Configuration is stored at `~/.config/rollcall/config.json` unless a
//! path is given explicitly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::submit::{SubmitOptions, UnknownStudentPolicy, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT};

/// Application name used for config directory paths
const APP_NAME: &str = "rollcall";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Canvas API root used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://canvas.instructure.com/api/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub course_id: Option<u64>,
    pub assignment_id: Option<u64>,
    pub attendance_path: Option<PathBuf>,
    pub attendance_sheet: Option<String>,
    pub ids_path: Option<PathBuf>,
    pub ids_sheet: Option<String>,
    pub token_path: Option<PathBuf>,
    pub max_concurrent: usize,
    pub request_timeout_secs: u64,
    pub abort_on_unknown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            course_id: None,
            assignment_id: None,
            attendance_path: None,
            attendance_sheet: None,
            ids_path: None,
            ids_sheet: None,
            token_path: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            request_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            abort_on_unknown: false,
        }
    }
}

impl Config {
    /// Load from the default location, or defaults if no file exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Names of settings a submission run cannot do without.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.course_id.is_none() {
            missing.push("course_id");
        }
        if self.assignment_id.is_none() {
            missing.push("assignment_id");
        }
        if self.attendance_path.is_none() {
            missing.push("attendance_path");
        }
        if self.ids_path.is_none() {
            missing.push("ids_path");
        }
        if self.base_url.trim().is_empty() {
            missing.push("base_url");
        }
        missing
    }

    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Missing configuration: {}", missing.join(", "))
        }
    }

    pub fn attendance_input(&self) -> Result<&Path> {
        self.attendance_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No attendance sheet configured (attendance_path / --attendance)"))
    }

    pub fn ids_input(&self) -> Result<&Path> {
        self.ids_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No ID roster configured (ids_path / --ids)"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            max_concurrent: self.max_concurrent.max(1),
            call_timeout: self.request_timeout(),
            unknown_student: if self.abort_on_unknown {
                UnknownStudentPolicy::Abort
            } else {
                UnknownStudentPolicy::Fail
            },
        }
    }
}
