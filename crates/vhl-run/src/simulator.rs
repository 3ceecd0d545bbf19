//! Capability boundary around the external circuit simulator.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vhl_core::config::SimulatorConfig;
use vhl_core::errors::{ErrorInfo, LabError};

/// Captured result of one simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// The wall-clock limit elapsed and the process was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Anything able to execute a netlist in batch mode.
///
/// Production wires [`ProcessSimulator`]; tests substitute in-memory stubs.
#[async_trait]
pub trait Simulator: Send + Sync {
    /// Runs the simulator non-interactively against `input`.
    ///
    /// Exit codes are reported, not interpreted. A timeout is reported
    /// through [`ProcessOutput::timed_out`] together with whatever output
    /// was captured before the kill.
    async fn run_batch(
        &self,
        input: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, LabError>;

    /// Best-effort version string; `None` when it cannot be determined.
    async fn probe_version(&self) -> Option<String>;

    /// Key under which the version is recorded in manifests.
    fn tool_name(&self) -> &str;
}

/// Launches the configured executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    config: SimulatorConfig,
}

impl ProcessSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

#[async_trait]
impl Simulator for ProcessSimulator {
    async fn run_batch(
        &self,
        input: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, LabError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.batch_args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(program = %self.config.program, input = %input.display(), "spawning simulator");

        let mut child = command.spawn().map_err(|err| spawn_error(&self.config.program, err))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (exit_code, timed_out) = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => (status.map_err(|err| wait_error(input, err))?.code(), false),
                Err(_) => {
                    warn!(
                        program = %self.config.program,
                        limit_secs = limit.as_secs_f64(),
                        "simulator exceeded its time limit; killing"
                    );
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "failed to kill timed out simulator");
                    }
                    (None, true)
                }
            },
            None => (
                child.wait().await.map_err(|err| wait_error(input, err))?.code(),
                false,
            ),
        };

        let (stdout, stderr) = tokio::join!(collect(stdout, timed_out), collect(stderr, timed_out));
        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }

    async fn probe_version(&self) -> Option<String> {
        let output = Command::new(&self.config.program)
            .args(&self.config.version_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(Duration::from_secs(10), output).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                debug!(error = %err, "version probe failed");
                return None;
            }
            Err(_) => {
                debug!("version probe timed out");
                return None;
            }
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        stdout
            .lines()
            .chain(stderr.lines())
            .find(|line| line.contains(self.config.version_marker.as_str()))
            .map(|line| line.trim().to_string())
    }

    fn tool_name(&self) -> &str {
        &self.config.program
    }
}

/// Grace period for output readers after a timed out child was killed.
///
/// Grandchildren may keep the pipes open long after the kill.
const READER_GRACE: Duration = Duration::from_secs(1);

struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

fn drain<R>(pipe: Option<R>) -> Option<Capture>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pipe.map(|mut reader| {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .extend_from_slice(&chunk[..read]),
                }
            }
        });
        Capture { buffer, task }
    })
}

async fn collect(capture: Option<Capture>, timed_out: bool) -> String {
    let Some(Capture { buffer, mut task }) = capture else {
        return String::new();
    };
    if timed_out {
        if tokio::time::timeout(READER_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    } else if let Err(err) = task.await {
        warn!(error = %err, "output reader task failed");
    }
    let bytes = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

fn spawn_error(program: &str, err: std::io::Error) -> LabError {
    LabError::Storage(
        ErrorInfo::new("simulator.spawn", err.to_string())
            .with_context("program", program)
            .with_hint("check that the simulator is installed and on PATH"),
    )
}

fn wait_error(input: &Path, err: std::io::Error) -> LabError {
    LabError::io("simulator.wait", input, err)
}
