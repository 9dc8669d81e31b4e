//! Resource file parsing
//!
//! A resource file is JSON:
//!
//! ```json
//! {
//!   "provider": { "region": "us-east-1" },
//!   "resources": [
//!     { "type": "ssm_maintenance_window", "name": "patching", "attributes": { ... } }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use cirrus_core::resource::{Resource, Value};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    provider: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// Provider settings and desired resources
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub provider: HashMap<String, Value>,
    pub resources: Vec<Resource>,
}

fn convert(
    map: serde_json::Map<String, serde_json::Value>,
    owner: &str,
) -> Result<HashMap<String, Value>, String> {
    map.into_iter()
        .map(|(key, value)| match Value::from_json(&value) {
            Some(v) => Ok((key, v)),
            None => Err(format!("{}: unsupported value for '{}': {}", owner, key, value)),
        })
        .collect()
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self, String> {
        let raw: RawManifest =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

        let provider = convert(raw.provider, "provider")?;
        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());
        for r in raw.resources {
            let label = format!("{}.{}", r.resource_type, r.name);
            if !seen.insert(label.clone()) {
                return Err(format!("Duplicate resource: {}", label));
            }
            let mut resource = Resource::new(r.resource_type, r.name);
            resource.attributes = convert(r.attributes, &label)?;
            resources.push(resource);
        }

        Ok(Self {
            provider,
            resources,
        })
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }
}
