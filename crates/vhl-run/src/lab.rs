use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vhl_core::config::LabConfig;
use vhl_core::errors::{ErrorInfo, LabError};
use vhl_template::{
    default_params, find_forbidden, parse_metadata, InventorySources, Metadata, ParamValue, Params,
    Renderer, TemplateInventory, TemplateKind, TemplateSummary,
};

use crate::manifest::{artifact, Manifest};
use crate::orchestrator::{blocking, RunOrchestrator, RunRequest, OUTPUT_DATA_PARAM};
use crate::simulator::{ProcessSimulator, Simulator};
use crate::store::{ensure_component, ProvenanceStore};
use crate::validator::{SimulatorValidator, Validator};

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Stored file name, always carrying the template suffix.
    pub name: String,
    pub kind: TemplateKind,
    pub path: PathBuf,
    pub default_params: Params,
}

/// One lab instance: template inventory, provenance store and the
/// simulator capabilities wired together.
pub struct Lab {
    config: LabConfig,
    inventory: Arc<TemplateInventory>,
    store: ProvenanceStore,
    simulator: Arc<dyn Simulator>,
    validator: Arc<dyn Validator>,
    orchestrator: RunOrchestrator,
}

impl Lab {
    /// Wires the configured executable as both runner and validator.
    pub fn open(config: LabConfig) -> Result<Self, LabError> {
        config.validate()?;
        let simulator: Arc<dyn Simulator> =
            Arc::new(ProcessSimulator::new(config.simulator.clone()));
        let validator: Arc<dyn Validator> = Arc::new(SimulatorValidator::new(
            Arc::clone(&simulator),
            config.simulator.validate_timeout(),
        ));
        Self::with_parts(config, simulator, validator)
    }

    /// Builds a lab around caller-provided capabilities.
    pub fn with_parts(
        config: LabConfig,
        simulator: Arc<dyn Simulator>,
        validator: Arc<dyn Validator>,
    ) -> Result<Self, LabError> {
        let inventory = Arc::new(TemplateInventory::load(InventorySources {
            models_dir: config.models_dir.clone(),
            controls_dir: config.controls_dir.clone(),
            suffix: config.template_suffix.clone(),
        })?);
        let store = ProvenanceStore::new(config.runs_dir.clone());
        let orchestrator = RunOrchestrator::new(
            Arc::clone(&inventory),
            store.clone(),
            Arc::clone(&simulator),
            Arc::clone(&validator),
            config.simulator.clone(),
            config.run.clone(),
        );
        Ok(Self {
            config,
            inventory,
            store,
            simulator,
            validator,
            orchestrator,
        })
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    pub fn inventory(&self) -> &TemplateInventory {
        &self.inventory
    }

    pub fn list_templates(&self, kind: TemplateKind) -> Vec<TemplateSummary> {
        self.inventory.list(kind)
    }

    pub fn template_metadata(&self, kind: TemplateKind, name: &str) -> Option<Metadata> {
        self.inventory.metadata(name, kind)
    }

    pub fn template_content(&self, kind: TemplateKind, name: &str) -> Option<String> {
        self.inventory.content(name, kind)
    }

    /// Rescans both template directories.
    pub async fn reload(&self) -> Result<(), LabError> {
        let inventory = Arc::clone(&self.inventory);
        blocking(move || inventory.reload()).await
    }

    /// Checks arbitrary circuit text with the simulator.
    pub async fn validate_text(&self, text: &str) -> Result<Option<String>, LabError> {
        self.validator.validate(text).await
    }

    /// Validates `content` and, only if it is accepted, stores it as a
    /// template of `kind` and reloads that collection.
    pub async fn upload_template(
        &self,
        kind: TemplateKind,
        filename: &str,
        content: &str,
    ) -> Result<UploadReceipt, LabError> {
        let name = normalize_filename(filename, &self.config.template_suffix)?;
        let (candidate, params) = self.candidate(kind, &name, content).await?;
        if let Some(message) = self.validator.validate(&candidate).await? {
            warn!(template = %name, %kind, "upload rejected by simulator");
            return Err(LabError::Rejected(
                ErrorInfo::new("upload.rejected", message).with_context("template", name),
            ));
        }

        let dir = self.inventory.sources().dir(kind).to_path_buf();
        let path = dir.join(&name);
        {
            let path = path.clone();
            let content = content.to_string();
            blocking(move || write_template(&dir, &path, &content)).await?;
        }
        let inventory = Arc::clone(&self.inventory);
        blocking(move || inventory.reload_kind(kind)).await?;
        info!(template = %name, %kind, path = %path.display(), "template uploaded");
        Ok(UploadReceipt {
            name,
            kind,
            path,
            default_params: params,
        })
    }

    /// Runs the upload checks on `content` without storing anything.
    ///
    /// Returns the simulator's failure message, if any.
    pub async fn check_template(
        &self,
        kind: TemplateKind,
        content: &str,
    ) -> Result<Option<String>, LabError> {
        let (candidate, _) = self.candidate(kind, "<candidate>", content).await?;
        self.validator.validate(&candidate).await
    }

    /// Builds the upload candidate on the blocking pool.
    async fn candidate(
        &self,
        kind: TemplateKind,
        name: &str,
        content: &str,
    ) -> Result<(String, Params), LabError> {
        let inventory = Arc::clone(&self.inventory);
        let forbidden = self.config.run.forbidden_directives.clone();
        let name = name.to_string();
        let content = content.to_string();
        blocking(move || build_candidate(&inventory, &forbidden, kind, &name, &content)).await
    }

    pub async fn start_sim(&self, request: RunRequest) -> Result<Manifest, LabError> {
        self.orchestrator.start_sim(request).await
    }

    /// Manifest of a finished run; `None` when no such run exists.
    pub fn read_results(&self, run_id: &str) -> Result<Option<Manifest>, LabError> {
        self.store.read(run_id)
    }

    /// Raw bytes of one artifact of a run.
    pub fn artifact(&self, run_id: &str, filename: &str) -> Result<Option<Vec<u8>>, LabError> {
        self.store.read_artifact(run_id, filename)
    }

    pub fn list_runs(&self) -> Result<Vec<String>, LabError> {
        self.store.list_runs()
    }

    pub async fn simulator_version(&self) -> Option<String> {
        self.simulator.probe_version().await
    }
}

/// Renders `content` with its default parameters, screens it for forbidden
/// directives and prepends the validation context.
fn build_candidate(
    inventory: &TemplateInventory,
    forbidden: &[String],
    kind: TemplateKind,
    name: &str,
    content: &str,
) -> Result<(String, Params), LabError> {
    let (metadata, body) = parse_metadata(content);
    let mut params = default_params(&metadata);
    if kind == TemplateKind::Control {
        params
            .entry(OUTPUT_DATA_PARAM.to_string())
            .or_insert_with(|| ParamValue::Str(artifact::DATA.to_string()));
    }
    let rendered = Renderer::new()
        .render_detached(&body, &params)
        .map_err(|err| with_template(err, name))?;

    if let Some(hit) = find_forbidden(&rendered, forbidden).into_iter().next() {
        return Err(LabError::Validation(
            ErrorInfo::new(
                "upload.forbidden_directive",
                format!("directive `{}` is not allowed", hit.directive),
            )
            .with_context("template", name)
            .with_context("line", hit.line.to_string()),
        ));
    }

    let candidate = format!("{}\n{}", validation_context(inventory, name), rendered);
    Ok((candidate, params))
}

/// Other model templates rendered with their defaults, so that uploads may
/// reference sub-circuits defined elsewhere in the inventory.
fn validation_context(inventory: &TemplateInventory, exclude: &str) -> String {
    let models = inventory.snapshot(TemplateKind::Model);
    let mut context = String::new();
    for record in models.records().filter(|record| record.name != exclude) {
        match models.render(&record.name, &record.default_params) {
            Ok(Some(text)) => {
                context.push_str(&text);
                context.push('\n');
            }
            Ok(None) => {}
            Err(err) => {
                debug!(template = %record.name, error = %err, "skipping model in validation context")
            }
        }
    }
    context
}

/// Forces the template suffix onto `filename`, replacing any other extension.
pub fn normalize_filename(filename: &str, suffix: &str) -> Result<String, LabError> {
    ensure_component("filename", filename)?;
    if filename.ends_with(suffix) {
        return Ok(filename.to_string());
    }
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);
    warn!(filename, suffix, "template name lacks suffix; replacing extension");
    Ok(format!("{stem}{suffix}"))
}

fn write_template(dir: &Path, path: &Path, content: &str) -> Result<(), LabError> {
    fs::create_dir_all(dir).map_err(|err| LabError::io("upload.create_dir", dir, err))?;
    fs::write(path, content).map_err(|err| LabError::io("upload.write", path, err))
}

fn with_template(err: LabError, name: &str) -> LabError {
    match err {
        LabError::Render(info) => LabError::Render(info.with_context("template", name)),
        other => other,
    }
}
