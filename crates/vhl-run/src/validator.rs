//! Pre-flight checks of circuit text against the external simulator.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use vhl_core::errors::{ErrorInfo, LabError};

use crate::simulator::{ProcessOutput, Simulator};

/// Message returned for blank input without consulting the simulator.
pub const EMPTY_INPUT_MESSAGE: &str = "SPICE code is empty.";

/// Case-insensitive marker that turns a non-zero exit into a hard failure.
const ERROR_MARKER: &str = "error:";

/// Checks whether a piece of circuit text is acceptable to the simulator.
#[async_trait]
pub trait Validator: Send + Sync {
    /// `Ok(None)` when acceptable, `Ok(Some(message))` on a hard failure.
    ///
    /// `Err` is reserved for infrastructure problems such as being unable to
    /// create the scratch file or launch the simulator.
    async fn validate(&self, text: &str) -> Result<Option<String>, LabError>;
}

/// Outcome of one validation invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Non-zero exit without the error marker; logged, not fatal.
    Warning(String),
    Failure(String),
}

/// Classifies the captured output of a batch validation run.
pub fn classify(output: &ProcessOutput) -> Verdict {
    if output.timed_out {
        return Verdict::Failure(format!(
            "SPICE code validation failed: simulator timed out\nSTDOUT:\n{}\nSTDERR:\n{}",
            output.stdout, output.stderr
        ));
    }
    if output.exit_code == Some(0) {
        return Verdict::Pass;
    }
    let flagged = [&output.stdout, &output.stderr]
        .iter()
        .any(|stream| stream.to_ascii_lowercase().contains(ERROR_MARKER));
    if flagged {
        Verdict::Failure(format!(
            "SPICE code validation failed:\nSTDOUT:\n{}\nSTDERR:\n{}",
            output.stdout, output.stderr
        ))
    } else {
        let code = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        Verdict::Warning(format!(
            "simulator exited with {code} without reporting an error"
        ))
    }
}

/// Validator that runs the configured simulator on a scratch copy of the text.
pub struct SimulatorValidator {
    simulator: Arc<dyn Simulator>,
    timeout: Duration,
}

impl SimulatorValidator {
    pub fn new(simulator: Arc<dyn Simulator>, timeout: Duration) -> Self {
        Self { simulator, timeout }
    }
}

#[async_trait]
impl Validator for SimulatorValidator {
    async fn validate(&self, text: &str) -> Result<Option<String>, LabError> {
        if text.trim().is_empty() {
            return Ok(Some(EMPTY_INPUT_MESSAGE.to_string()));
        }

        // Removed when `scratch` drops, whichever way this function returns.
        let mut scratch = tempfile::Builder::new()
            .prefix("vhl-validate-")
            .suffix(".cir")
            .tempfile()
            .map_err(|err| {
                LabError::Storage(ErrorInfo::new("validator.scratch", err.to_string()))
            })?;
        let path = scratch.path().to_path_buf();
        scratch
            .write_all(text.as_bytes())
            .and_then(|()| scratch.flush())
            .map_err(|err| LabError::io("validator.scratch", &path, err))?;

        let output = self
            .simulator
            .run_batch(&path, Some(self.timeout))
            .await?;
        match classify(&output) {
            Verdict::Pass => {
                debug!(tool = self.simulator.tool_name(), "content accepted");
                Ok(None)
            }
            Verdict::Warning(message) => {
                warn!(tool = self.simulator.tool_name(), %message, "validation finished with warnings");
                Ok(None)
            }
            Verdict::Failure(message) => Ok(Some(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    #[test]
    fn zero_exit_passes_even_with_marker() {
        assert_eq!(classify(&output(Some(0), "Error: noise", "")), Verdict::Pass);
    }

    #[test]
    fn marker_is_case_insensitive_on_either_stream() {
        let verdict = classify(&output(Some(1), "", "ERROR: unknown device"));
        match verdict {
            Verdict::Failure(message) => {
                assert!(message.starts_with("SPICE code validation failed"));
                assert!(message.contains("ERROR: unknown device"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn non_zero_without_marker_is_a_warning() {
        assert!(matches!(
            classify(&output(Some(3), "circuit parsed", "")),
            Verdict::Warning(_)
        ));
    }

    #[test]
    fn timeout_is_a_failure() {
        let mut timed_out = output(None, "partial", "");
        timed_out.timed_out = true;
        assert!(matches!(classify(&timed_out), Verdict::Failure(_)));
    }
}
