use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vhl_core::errors::{ErrorInfo, LabError};
use walkdir::WalkDir;

use crate::metadata::{self, Metadata};
use crate::params::{default_params, Params, ParamValue};
use crate::render::Renderer;
use crate::scan::{extract_includes, extract_subcircuits};

/// The two template collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Model,
    Control,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 2] = [TemplateKind::Model, TemplateKind::Control];

    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Model => "model",
            TemplateKind::Control => "control",
        }
    }

    fn registry_key(self, name: &str) -> String {
        format!("{}/{}", self.as_str(), name)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateKind {
    type Err = LabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "model" | "models" => Ok(TemplateKind::Model),
            "control" | "controls" => Ok(TemplateKind::Control),
            other => Err(LabError::Validation(
                ErrorInfo::new("template.kind", format!("unknown template kind `{other}`"))
                    .with_hint("expected `model` or `control`"),
            )),
        }
    }
}

/// A parsed template file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub name: String,
    pub kind: TemplateKind,
    pub raw_text: String,
    pub metadata: Metadata,
    pub body: String,
    /// Sub-circuit names declared in the body (model templates only).
    #[serde(default)]
    pub declared_substructures: Vec<String>,
    /// External files referenced from the body (model templates only).
    #[serde(default)]
    pub declared_references: Vec<String>,
    pub default_params: Params,
}

impl TemplateRecord {
    /// Parses `raw_text` into a record; never fails on bad metadata.
    pub fn from_text(name: impl Into<String>, kind: TemplateKind, raw_text: String) -> Self {
        let (metadata, body) = metadata::parse(&raw_text);
        let (declared_substructures, declared_references) = match kind {
            TemplateKind::Model => (extract_subcircuits(&body), extract_includes(&body)),
            TemplateKind::Control => (Vec::new(), Vec::new()),
        };
        let default_params = default_params(&metadata);
        Self {
            name: name.into(),
            kind,
            raw_text,
            metadata,
            body,
            declared_substructures,
            declared_references,
            default_params,
        }
    }
}

/// Name and metadata pair returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub name: String,
    pub metadata: Metadata,
}

/// Immutable snapshot of one template collection plus its bound renderer.
#[derive(Debug, Clone)]
pub struct Catalog {
    kind: TemplateKind,
    records: BTreeMap<String, TemplateRecord>,
    renderer: Renderer,
}

impl Catalog {
    pub fn new(kind: TemplateKind, records: BTreeMap<String, TemplateRecord>) -> Self {
        let mut renderer = Renderer::new();
        for record in records.values() {
            if let Err(err) = renderer.register(&kind.registry_key(&record.name), &record.body) {
                warn!(template = %record.name, %kind, error = %err, "template body does not compile");
            }
        }
        Self {
            kind,
            records,
            renderer,
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&TemplateRecord> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TemplateRecord> {
        self.records.values()
    }

    /// Renders the named template's body with `params`.
    ///
    /// Returns `Ok(None)` when the name is unknown.
    pub fn render<'a, I>(&self, name: &str, params: I) -> Result<Option<String>, LabError>
    where
        I: IntoIterator<Item = (&'a String, &'a ParamValue)>,
    {
        let Some(record) = self.records.get(name) else {
            return Ok(None);
        };
        let key = self.kind.registry_key(name);
        let rendered = if self.renderer.contains(&key) {
            self.renderer.render(&key, params)?
        } else {
            // Registration failed at load time; surface the same syntax error.
            self.renderer.render_detached(&record.body, params)?
        };
        Ok(Some(rendered))
    }
}

/// Reads every template with `suffix` directly inside `dir`.
///
/// A missing directory is an empty collection; subdirectories are not
/// descended into. Symlinked files count as templates, dangling links are
/// skipped.
pub fn load_dir(
    dir: &Path,
    kind: TemplateKind,
    suffix: &str,
) -> Result<BTreeMap<String, TemplateRecord>, LabError> {
    let mut records = BTreeMap::new();
    if !dir.exists() {
        debug!(path = %dir.display(), %kind, "template directory missing; inventory empty");
        return Ok(records);
    }
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() > 0 => {
                warn!(%kind, error = %err, "skipping unreadable template entry");
                continue;
            }
            Err(err) => {
                return Err(LabError::Storage(
                    ErrorInfo::new("inventory.walk", err.to_string())
                        .with_context("path", dir.display().to_string()),
                ))
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }
        let raw_text = fs::read_to_string(entry.path())
            .map_err(|err| LabError::io("inventory.read", entry.path(), err))?;
        records.insert(
            name.to_string(),
            TemplateRecord::from_text(name, kind, raw_text),
        );
    }
    Ok(records)
}

/// Source directories for both collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySources {
    pub models_dir: PathBuf,
    pub controls_dir: PathBuf,
    pub suffix: String,
}

impl InventorySources {
    pub fn dir(&self, kind: TemplateKind) -> &Path {
        match kind {
            TemplateKind::Model => &self.models_dir,
            TemplateKind::Control => &self.controls_dir,
        }
    }
}

/// In-memory directory of model and control templates.
///
/// Each collection is an immutable [`Catalog`] behind an `Arc`. Reloading
/// builds a complete replacement first and swaps it in under the write lock,
/// so readers only ever see a whole catalog.
#[derive(Debug)]
pub struct TemplateInventory {
    sources: InventorySources,
    models: RwLock<Arc<Catalog>>,
    controls: RwLock<Arc<Catalog>>,
}

impl TemplateInventory {
    /// Scans both directories.
    pub fn load(sources: InventorySources) -> Result<Self, LabError> {
        let models = Self::build(&sources, TemplateKind::Model)?;
        let controls = Self::build(&sources, TemplateKind::Control)?;
        info!(
            models = models.len(),
            controls = controls.len(),
            "template inventory loaded"
        );
        Ok(Self {
            sources,
            models: RwLock::new(Arc::new(models)),
            controls: RwLock::new(Arc::new(controls)),
        })
    }

    pub fn sources(&self) -> &InventorySources {
        &self.sources
    }

    fn build(sources: &InventorySources, kind: TemplateKind) -> Result<Catalog, LabError> {
        let records = load_dir(sources.dir(kind), kind, &sources.suffix)?;
        Ok(Catalog::new(kind, records))
    }

    fn slot(&self, kind: TemplateKind) -> &RwLock<Arc<Catalog>> {
        match kind {
            TemplateKind::Model => &self.models,
            TemplateKind::Control => &self.controls,
        }
    }

    /// Current catalog for `kind`; stays valid across later reloads.
    pub fn snapshot(&self, kind: TemplateKind) -> Arc<Catalog> {
        let guard = self
            .slot(kind)
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Rescans one collection and replaces it wholesale.
    pub fn reload_kind(&self, kind: TemplateKind) -> Result<usize, LabError> {
        let catalog = Self::build(&self.sources, kind)?;
        let count = catalog.len();
        let mut guard = self
            .slot(kind)
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(catalog);
        info!(%kind, templates = count, "template collection reloaded");
        Ok(count)
    }

    pub fn reload(&self) -> Result<(), LabError> {
        for kind in TemplateKind::ALL {
            self.reload_kind(kind)?;
        }
        Ok(())
    }

    pub fn list(&self, kind: TemplateKind) -> Vec<TemplateSummary> {
        self.snapshot(kind)
            .records()
            .map(|record| TemplateSummary {
                name: record.name.clone(),
                metadata: record.metadata.clone(),
            })
            .collect()
    }

    pub fn get(&self, name: &str, kind: TemplateKind) -> Option<TemplateRecord> {
        self.snapshot(kind).get(name).cloned()
    }

    pub fn metadata(&self, name: &str, kind: TemplateKind) -> Option<Metadata> {
        self.snapshot(kind).get(name).map(|record| record.metadata.clone())
    }

    pub fn content(&self, name: &str, kind: TemplateKind) -> Option<String> {
        self.snapshot(kind).get(name).map(|record| record.raw_text.clone())
    }

    /// Renders a stored template against the current catalog.
    pub fn render(
        &self,
        name: &str,
        kind: TemplateKind,
        params: &Params,
    ) -> Result<Option<String>, LabError> {
        self.snapshot(kind).render(name, params)
    }
}
