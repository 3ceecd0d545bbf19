//! Embedded metadata blocks at the top of template files.
//!
//! A block looks like
//!
//! ```text
//! *---
//! * parameters:
//! *   r:
//! *     type: float
//! *     default: 1000
//! *---
//! R1 1 2 {{r}}
//! ```
//!
//! Every line inside the delimiters may carry the netlist comment prefix
//! `"* "`, which is removed before the block is read as YAML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::params::ParamSpec;

/// Delimiter line opening and closing a metadata block.
pub const METADATA_DELIMITER: &str = "*---\n";
const COMMENT_PREFIX: &str = "* ";

/// Loosely typed metadata mapping as written in the template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Typed parameter declarations found under the `parameters` key.
    ///
    /// Entries that do not describe a parameter are skipped with a warning
    /// so that one bad declaration does not hide the others.
    pub fn parameters(&self) -> BTreeMap<String, ParamSpec> {
        let Some(Value::Object(declared)) = self.0.get("parameters") else {
            return BTreeMap::new();
        };
        declared
            .iter()
            .filter_map(|(name, raw)| {
                match serde_json::from_value::<ParamSpec>(raw.clone()) {
                    Ok(spec) => Some((name.clone(), spec)),
                    Err(err) => {
                        warn!(parameter = %name, error = %err, "ignoring malformed parameter declaration");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Splits `content` into its metadata block and the remaining body.
///
/// Missing delimiters, unreadable YAML and non-mapping documents all yield
/// an empty [`Metadata`] with the content returned untouched. Only the first
/// delimiter pair is honoured.
pub fn parse(content: &str) -> (Metadata, String) {
    let Some(start) = content.find(METADATA_DELIMITER) else {
        return (Metadata::default(), content.to_string());
    };
    let block_start = start + METADATA_DELIMITER.len();
    let Some(relative_end) = content[block_start..].find(METADATA_DELIMITER) else {
        return (Metadata::default(), content.to_string());
    };
    let block_end = block_start + relative_end;

    let block = content[block_start..block_end].trim();
    let cleaned = block
        .lines()
        .map(|line| line.strip_prefix(COMMENT_PREFIX).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");

    match serde_yaml::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => {
            let body = content[block_end + METADATA_DELIMITER.len()..]
                .trim()
                .to_string();
            (Metadata(map.into_iter().collect()), body)
        }
        Ok(_) => {
            warn!("metadata block is not a mapping; treating as no metadata");
            (Metadata::default(), content.to_string())
        }
        Err(err) => {
            warn!(error = %err, "failed to parse metadata block; treating as no metadata");
            (Metadata::default(), content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unterminated_block_is_ignored() {
        let content = "*---\nk: v\nR1 1 2 1k\n";
        let (metadata, body) = parse(content);
        assert!(metadata.is_empty());
        assert_eq!(body, content);
    }

    #[test]
    fn scalar_block_is_not_metadata() {
        let content = "*---\njust a sentence\n*---\nR1 1 2 1k";
        let (metadata, body) = parse(content);
        assert!(metadata.is_empty());
        assert_eq!(body, content);
    }
}
