//! Circuit template handling: embedded metadata, typed parameters,
//! deterministic rendering and the in-memory template inventory.

pub mod inventory;
pub mod metadata;
pub mod params;
pub mod render;
pub mod scan;

pub use inventory::{
    load_dir, Catalog, InventorySources, TemplateInventory, TemplateKind, TemplateRecord,
    TemplateSummary,
};
pub use metadata::{parse as parse_metadata, Metadata, METADATA_DELIMITER};
pub use params::{
    default_params, params_to_json, resolve_params, ParamSpec, ParamType, ParamValue, Params,
    STR_PLACEHOLDER,
};
pub use render::{render, Renderer};
pub use scan::{extract_includes, extract_subcircuits, find_forbidden, ForbiddenHit};
