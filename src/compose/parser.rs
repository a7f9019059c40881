//! Parses one docker-compose document into its declared service names.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Extract the declared service names from one compose document, in
/// document order.
///
/// A document with no `services` key (or an empty one) declares zero
/// services; that is not an error. Duplicate names collapse to the first
/// occurrence. A document that is not a mapping, or whose `services` value
/// is not a mapping, is a parse error.
pub fn parse_services(path: &Path, content: &str) -> Result<Vec<String>> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| parse_err(path, e))?;

    let mapping = match &doc {
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => {
            return Err(parse_err(path, "document is not a mapping"));
        }
    };

    let services = match mapping.get("services") {
        None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
        Some(serde_yaml::Value::Mapping(services)) => services,
        Some(_) => {
            return Err(parse_err(path, "'services' is not a mapping"));
        }
    };

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for key in services.keys() {
        let name = match key {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(parse_err(
                    path,
                    format!("service name is not a string: {:?}", other),
                ));
            }
        };
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }

    Ok(names)
}

fn parse_err(path: &Path, message: impl ToString) -> Error {
    Error::DefinitionParse {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
