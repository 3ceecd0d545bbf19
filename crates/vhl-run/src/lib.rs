//! Simulation runs for the Virtual Hardware Lab: the external simulator
//! capability, content validation, run orchestration and the provenance
//! store that records every run.

pub mod lab;
pub mod manifest;
pub mod orchestrator;
pub mod plot;
pub mod simulator;
pub mod store;
pub mod validator;

pub use lab::{normalize_filename, Lab, UploadReceipt};
pub use manifest::{artifact, Manifest, RunStatus, TemplateRef, MANIFEST_FILE};
pub use orchestrator::{
    derive_run_id, merge_documents, RunOrchestrator, RunRequest, MERGE_DIVIDER,
    OUTPUT_DATA_PARAM, UNKNOWN_VERSION,
};
pub use plot::{parse_impedance_table, render_nyquist_svg, ImpedancePoint, PlotConfig};
pub use simulator::{ProcessOutput, ProcessSimulator, Simulator};
pub use store::{ensure_component, ProvenanceStore};
pub use validator::{classify, SimulatorValidator, Validator, Verdict, EMPTY_INPUT_MESSAGE};
