use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use vhl_core::config::{RunPolicy, SimulatorConfig};
use vhl_core::errors::{ErrorInfo, LabError};
use vhl_core::hash::{compute_sha256, params_fingerprint};
use vhl_template::{
    find_forbidden, resolve_params, Catalog, ParamValue, Params, TemplateInventory, TemplateKind,
};

use crate::manifest::{artifact, Manifest, RunStatus, TemplateRef};
use crate::plot::{parse_impedance_table, render_nyquist_svg, PlotConfig};
use crate::simulator::{ProcessOutput, Simulator};
use crate::store::{ensure_component, ProvenanceStore};
use crate::validator::Validator;

/// Control parameter through which the run's data path reaches the deck.
pub const OUTPUT_DATA_PARAM: &str = "output_data_file";

/// Separator placed between the rendered model and control documents.
pub const MERGE_DIVIDER: &str = "\n\n* --- control ---\n";

/// Version recorded when the simulator cannot report one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Caller input for [`RunOrchestrator::start_sim`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub model_name: String,
    #[serde(default)]
    pub model_params: BTreeMap<String, Value>,
    pub control_name: String,
    #[serde(default)]
    pub control_params: BTreeMap<String, Value>,
    /// Explicit run id; derived from time and parameters when absent.
    #[serde(default)]
    pub run_id: Option<String>,
}

impl RunRequest {
    pub fn new(model_name: impl Into<String>, control_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            control_name: control_name.into(),
            ..Self::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_model_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.model_params.insert(name.into(), value);
        self
    }

    pub fn with_control_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.control_params.insert(name.into(), value);
        self
    }
}

/// `"{model}\n\n* --- control ---\n{control}"`.
pub fn merge_documents(model: &str, control: &str) -> String {
    format!("{model}{MERGE_DIVIDER}{control}")
}

/// `<UTC timestamp with microseconds>_<parameter fingerprint>`.
pub fn derive_run_id(
    model_params: &BTreeMap<String, Value>,
    control_params: &BTreeMap<String, Value>,
) -> Result<String, LabError> {
    let fingerprint = params_fingerprint(model_params, control_params)?;
    Ok(format!(
        "{}_{}",
        Utc::now().format("%Y%m%d%H%M%S%6f"),
        fingerprint
    ))
}

struct Rendered {
    model_text: String,
    control_text: String,
    merged_text: String,
}

struct Staged {
    model_params: Params,
    control_params: Params,
    rendered: Rendered,
}

/// Drives a run from template lookup to a written manifest.
pub struct RunOrchestrator {
    inventory: Arc<TemplateInventory>,
    store: ProvenanceStore,
    simulator: Arc<dyn Simulator>,
    validator: Arc<dyn Validator>,
    simulator_config: SimulatorConfig,
    policy: RunPolicy,
    plot: PlotConfig,
}

impl RunOrchestrator {
    pub fn new(
        inventory: Arc<TemplateInventory>,
        store: ProvenanceStore,
        simulator: Arc<dyn Simulator>,
        validator: Arc<dyn Validator>,
        simulator_config: SimulatorConfig,
        policy: RunPolicy,
    ) -> Self {
        Self {
            inventory,
            store,
            simulator,
            validator,
            simulator_config,
            policy,
            plot: PlotConfig::default(),
        }
    }

    /// Renders, merges, executes and records one simulation.
    ///
    /// Lookup, parameter and preflight failures leave no run directory
    /// behind. Once the simulator has been started a manifest is always
    /// written, exactly once; a timeout or launch failure is returned
    /// afterwards. The plot is derived before the manifest so that its
    /// artifact listing is final.
    pub async fn start_sim(&self, request: RunRequest) -> Result<Manifest, LabError> {
        let (run_id, reserved) = self.assign_run_id(&request).await?;
        transition(&run_id, RunStatus::Pending);

        let Staged {
            model_params,
            control_params,
            rendered,
        } = match self.stage(&run_id, &request).await {
            Ok(staged) => staged,
            Err(err) => {
                if reserved {
                    self.store.release_run_dir(&run_id);
                }
                return Err(err);
            }
        };
        let model_hash = compute_sha256(&rendered.model_text);
        let control_hash = compute_sha256(&rendered.control_text);
        let merged_hash = compute_sha256(&rendered.merged_text);

        let merged_path = {
            let store = self.store.clone();
            let run_id = run_id.clone();
            blocking(move || materialize(&store, &run_id, &rendered)).await?
        };

        transition(&run_id, RunStatus::Executing);
        let timeout = self.simulator_config.run_timeout();
        let execution = self.simulator.run_batch(&merged_path, Some(timeout)).await;
        let (status, exit_code, execution_log, failure) = match execution {
            Ok(output) if output.timed_out => {
                let error = LabError::Timeout(
                    ErrorInfo::new(
                        "run.timeout",
                        format!("simulator exceeded {}s", timeout.as_secs()),
                    )
                    .with_context("run_id", run_id.clone()),
                );
                (RunStatus::TimedOut, None, timeout_log(&output), Some(error))
            }
            Ok(output) => {
                match output.exit_code {
                    Some(0) => debug!(run_id = %run_id, "simulator finished cleanly"),
                    code => warn!(run_id = %run_id, exit_code = ?code, "simulator exited non-zero"),
                }
                let log = format!("{}{}", output.stdout, output.stderr);
                (RunStatus::Completed, output.exit_code, log, None)
            }
            Err(err) => {
                let log = format!("LaunchError:\n{err}\n");
                (RunStatus::Failed, None, log, Some(err))
            }
        };
        self.store
            .write_artifact(&run_id, artifact::LOG, execution_log.as_bytes())?;

        if failure.is_none() {
            self.plot_nyquist(&run_id);
        }

        let tool_version = self
            .simulator
            .probe_version()
            .await
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let manifest = Manifest {
            sim_id: run_id.clone(),
            status,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            model: TemplateRef {
                name: request.model_name,
                params: model_params,
                sha256: model_hash,
            },
            control: TemplateRef {
                name: request.control_name,
                params: control_params,
                sha256: control_hash,
            },
            merged_netlist_sha256: merged_hash,
            tool_versions: BTreeMap::from([(
                self.simulator.tool_name().to_string(),
                tool_version,
            )]),
            exit_code,
            artifacts: self.present_artifacts(&run_id),
            execution_log,
        };
        self.store.write_manifest(&manifest)?;
        transition(&run_id, status);

        if let Some(err) = failure {
            return Err(err);
        }
        info!(run_id = %run_id, exit_code = ?manifest.exit_code, "run recorded");
        Ok(manifest)
    }

    /// Explicit ids are taken as given. Derived ids are reserved by creating
    /// their directory, so concurrent runs never share one; the flag reports
    /// whether a reservation was made.
    async fn assign_run_id(&self, request: &RunRequest) -> Result<(String, bool), LabError> {
        if let Some(run_id) = &request.run_id {
            ensure_component("run_id", run_id)?;
            return Ok((run_id.clone(), false));
        }
        let store = self.store.clone();
        let model_params = request.model_params.clone();
        let control_params = request.control_params.clone();
        blocking(move || loop {
            let run_id = derive_run_id(&model_params, &control_params)?;
            if store.reserve_run_dir(&run_id)? {
                return Ok((run_id, true));
            }
            debug!(run_id = %run_id, "derived run id already taken");
        })
        .await
    }

    /// Resolves parameters, renders both documents and runs the preflight
    /// checks. Nothing is written to the run directory.
    async fn stage(&self, run_id: &str, request: &RunRequest) -> Result<Staged, LabError> {
        let models = self.inventory.snapshot(TemplateKind::Model);
        let controls = self.inventory.snapshot(TemplateKind::Control);
        let model_params = resolve_for(&models, &request.model_name, &request.model_params)?;
        let mut control_params =
            resolve_for(&controls, &request.control_name, &request.control_params)?;
        let data_path = self.store.artifact_path(run_id, artifact::DATA)?;
        control_params.insert(
            OUTPUT_DATA_PARAM.to_string(),
            ParamValue::Str(data_path.display().to_string()),
        );

        transition(run_id, RunStatus::Rendering);
        let rendered = {
            let model_name = request.model_name.clone();
            let control_name = request.control_name.clone();
            let model_params = model_params.clone();
            let control_params = control_params.clone();
            blocking(move || {
                let model_text = render_known(&models, &model_name, &model_params)?;
                let control_text = render_known(&controls, &control_name, &control_params)?;
                let merged_text = merge_documents(&model_text, &control_text);
                Ok(Rendered {
                    model_text,
                    control_text,
                    merged_text,
                })
            })
            .await?
        };
        transition(run_id, RunStatus::Merged);

        self.preflight(run_id, &rendered.merged_text).await?;
        Ok(Staged {
            model_params,
            control_params,
            rendered,
        })
    }

    async fn preflight(&self, run_id: &str, merged: &str) -> Result<(), LabError> {
        if let Some(hit) = find_forbidden(merged, &self.policy.forbidden_directives)
            .into_iter()
            .next()
        {
            return Err(LabError::Validation(
                ErrorInfo::new(
                    "run.forbidden_directive",
                    format!("directive `{}` is not allowed", hit.directive),
                )
                .with_context("run_id", run_id)
                .with_context("line", hit.line.to_string()),
            ));
        }
        if self.policy.preflight_validation {
            if let Some(message) = self.validator.validate(merged).await? {
                return Err(LabError::Rejected(
                    ErrorInfo::new("run.preflight", message).with_context("run_id", run_id),
                ));
            }
        }
        Ok(())
    }

    fn present_artifacts(&self, run_id: &str) -> BTreeMap<String, String> {
        [
            ("model", artifact::MODEL),
            ("control", artifact::CONTROL),
            ("merged", artifact::MERGED),
            ("simulator_log", artifact::LOG),
            ("sim_data", artifact::DATA),
            ("nyquist_plot", artifact::PLOT),
        ]
        .into_iter()
        .filter(|(_, file)| {
            self.store
                .artifact_path(run_id, file)
                .map(|path| path.is_file())
                .unwrap_or(false)
        })
        .map(|(kind, file)| (kind.to_string(), file.to_string()))
        .collect()
    }

    /// Best effort; failures are only logged.
    fn plot_nyquist(&self, run_id: &str) {
        let data = match self.store.read_artifact(run_id, artifact::DATA) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(run_id, "no impedance data; skipping plot");
                return;
            }
            Err(err) => {
                warn!(run_id, error = %err, "impedance data unreadable");
                return;
            }
        };
        let points = parse_impedance_table(&String::from_utf8_lossy(&data));
        if points.is_empty() {
            warn!(run_id, "impedance data has no usable rows");
            return;
        }
        let svg = render_nyquist_svg(&points, run_id, &self.plot);
        if let Err(err) = self.store.write_artifact(run_id, artifact::PLOT, svg.as_bytes()) {
            warn!(run_id, error = %err, "failed to write plot");
        }
    }
}

fn transition(run_id: &str, status: RunStatus) {
    if status.is_terminal() {
        info!(run_id, status = %status, "run finished");
    } else {
        debug!(run_id, status = %status, "run status");
    }
}

fn resolve_for(
    catalog: &Catalog,
    name: &str,
    supplied: &BTreeMap<String, Value>,
) -> Result<Params, LabError> {
    let record = catalog.get(name).ok_or_else(|| unknown_template(catalog.kind(), name))?;
    resolve_params(&record.metadata, supplied).map_err(|err| match err {
        LabError::Validation(info) => {
            LabError::Validation(info.with_context("template", name.to_string()))
        }
        other => other,
    })
}

fn render_known(catalog: &Catalog, name: &str, params: &Params) -> Result<String, LabError> {
    catalog
        .render(name, params)?
        .ok_or_else(|| unknown_template(catalog.kind(), name))
}

fn unknown_template(kind: TemplateKind, name: &str) -> LabError {
    LabError::Validation(
        ErrorInfo::new("run.unknown_template", format!("no {kind} template named `{name}`"))
            .with_context("kind", kind.as_str())
            .with_context("template", name),
    )
}

fn materialize(
    store: &ProvenanceStore,
    run_id: &str,
    rendered: &Rendered,
) -> Result<PathBuf, LabError> {
    store.create_run_dir(run_id)?;
    // A reused run id must not report data from an earlier execution.
    for stale in [artifact::DATA, artifact::PLOT] {
        let path = store.artifact_path(run_id, stale)?;
        match fs::remove_file(&path) {
            Ok(()) => debug!(run_id, file = stale, "removed stale artifact"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(LabError::io("store.remove_stale", &path, err)),
        }
    }
    store.write_artifact(run_id, artifact::MODEL, rendered.model_text.as_bytes())?;
    store.write_artifact(run_id, artifact::CONTROL, rendered.control_text.as_bytes())?;
    store.write_artifact(run_id, artifact::MERGED, rendered.merged_text.as_bytes())
}

fn timeout_log(output: &ProcessOutput) -> String {
    format!(
        "TimeoutExpired:\nStdout:\n{}\nStderr:\n{}\n",
        output.stdout, output.stderr
    )
}

pub(crate) async fn blocking<T, F>(work: F) -> Result<T, LabError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LabError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| LabError::Storage(ErrorInfo::new("run.worker", err.to_string())))?
}
