use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use vhl_template::Params;

/// File name of the manifest inside a run directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Well-known artifact file names inside a run directory.
pub mod artifact {
    pub const MODEL: &str = "model.cir";
    pub const CONTROL: &str = "control.cir";
    pub const MERGED: &str = "merged.cir";
    pub const LOG: &str = "simulator.log";
    pub const DATA: &str = "sim_data.txt";
    pub const PLOT: &str = "nyquist_plot.svg";
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Pending,
    Rendering,
    Merged,
    Executing,
    Completed,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Rendering => "rendering",
            RunStatus::Merged => "merged",
            RunStatus::Executing => "executing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed-out",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::TimedOut
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered template as recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    pub params: Params,
    pub sha256: String,
}

/// Reproducibility record written as `manifest.json` for every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub sim_id: String,
    pub status: RunStatus,
    /// RFC 3339 UTC timestamp of manifest creation.
    pub created_at: String,
    pub model: TemplateRef,
    pub control: TemplateRef,
    pub merged_netlist_sha256: String,
    /// Tool name to probed version, `"unknown"` when the probe failed.
    pub tool_versions: BTreeMap<String, String>,
    /// `None` when the simulator was killed.
    pub exit_code: Option<i32>,
    /// Artifact kind to path, relative to the run directory.
    pub artifacts: BTreeMap<String, String>,
    /// Full execution log, identical to the `simulator.log` artifact.
    pub execution_log: String,
}

impl Manifest {
    pub fn artifact(&self, kind: &str) -> Option<&str> {
        self.artifacts.get(kind).map(String::as_str)
    }
}
