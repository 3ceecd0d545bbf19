use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, LabError};

/// YAML-configurable layout and tool settings for a lab instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Directory holding model templates.
    pub models_dir: PathBuf,
    /// Directory holding control templates.
    pub controls_dir: PathBuf,
    /// Directory under which every run gets its own subdirectory.
    pub runs_dir: PathBuf,
    /// File suffix identifying template files.
    pub template_suffix: String,
    /// External simulator invocation.
    pub simulator: SimulatorConfig,
    /// Run-time policy.
    pub run: RunPolicy,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            controls_dir: PathBuf::from("controls"),
            runs_dir: PathBuf::from("runs"),
            template_suffix: ".j2".into(),
            simulator: SimulatorConfig::default(),
            run: RunPolicy::default(),
        }
    }
}

/// How the external circuit simulator is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Executable name or path.
    pub program: String,
    /// Arguments placed before the input file for batch execution.
    pub batch_args: Vec<String>,
    /// Arguments used to query the tool version.
    pub version_args: Vec<String>,
    /// Substring identifying the version line in the probe output.
    pub version_marker: String,
    /// Wall-clock bound for a simulation run.
    pub timeout_secs: u64,
    /// Wall-clock bound for a validation check.
    pub validate_timeout_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: "ngspice".into(),
            batch_args: vec!["-b".into()],
            version_args: vec!["-v".into()],
            version_marker: "ngspice".into(),
            timeout_secs: 60,
            validate_timeout_secs: 30,
        }
    }
}

impl SimulatorConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }
}

/// Policy knobs applied by the run orchestrator and upload path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPolicy {
    /// Validate the merged document with the simulator before executing it.
    pub preflight_validation: bool,
    /// Directives that may not appear in rendered templates.
    pub forbidden_directives: Vec<String>,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            preflight_validation: false,
            forbidden_directives: vec!["shell".into()],
        }
    }
}

impl LabConfig {
    /// Loads a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, LabError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            LabError::Config(
                ErrorInfo::new("config.read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let config: LabConfig = serde_yaml::from_str(&contents).map_err(|err| {
            LabError::Config(
                ErrorInfo::new("config.parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves relative template and run directories against `root`.
    pub fn rooted(mut self, root: &Path) -> Self {
        for dir in [
            &mut self.models_dir,
            &mut self.controls_dir,
            &mut self.runs_dir,
        ] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), LabError> {
        if self.template_suffix.trim().is_empty() {
            return Err(LabError::Config(ErrorInfo::new(
                "config.template_suffix",
                "template suffix must not be empty",
            )));
        }
        if self.simulator.program.trim().is_empty() {
            return Err(LabError::Config(ErrorInfo::new(
                "config.simulator_program",
                "simulator program must not be empty",
            )));
        }
        if self.simulator.timeout_secs == 0 || self.simulator.validate_timeout_secs == 0 {
            return Err(LabError::Config(
                ErrorInfo::new("config.timeout", "simulator timeouts must be positive")
                    .with_hint("set simulator.timeout_secs and simulator.validate_timeout_secs"),
            ));
        }
        Ok(())
    }
}
