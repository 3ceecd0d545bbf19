//! Shared building blocks for the Virtual Hardware Lab: structured errors,
//! canonical serialization, content hashing and configuration.

pub mod config;
pub mod errors;
pub mod hash;
pub mod serde;

pub use config::{LabConfig, RunPolicy, SimulatorConfig};
pub use errors::{ErrorInfo, LabError};
pub use hash::{compute_sha256, compute_sha256_bytes, params_fingerprint};
pub use crate::serde::{from_json_slice, to_canonical_json_bytes, to_pretty_json_string};
