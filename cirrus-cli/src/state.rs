//! State file structures for persisting remote identities between runs

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use cirrus_core::resource::State;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when reading or writing the state file
#[derive(Debug, Error)]
pub enum StateError {
    /// State file is corrupted or invalid
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// The main state file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage
    pub lineage: String,
    /// Version of Cirrus that last modified this state
    pub cirrus_version: String,
    /// All managed resources and their last observed state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Default state file name
    pub const DEFAULT_PATH: &'static str = "cirrus.state.json";

    /// Create a new empty state file
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            cirrus_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Read the state at `path`, starting empty when there is none yet
    pub fn load(path: &Path) -> Result<Self, StateError> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| StateError::Io(format!("Failed to read state file: {}", e)))?;
        let state: StateFile = serde_json::from_str(&content)
            .map_err(|e| StateError::InvalidState(format!("Failed to parse state file: {}", e)))?;

        if state.version > Self::CURRENT_VERSION {
            return Err(StateError::InvalidState(format!(
                "unsupported state version {}",
                state.version
            )));
        }
        Ok(state)
    }

    /// Write the state to `path` as a new serial
    pub fn save(&mut self, path: &Path) -> Result<(), StateError> {
        self.serial += 1;
        self.cirrus_version = env!("CARGO_PKG_VERSION").to_string();

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StateError::Serialization(format!("Failed to serialize state: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| StateError::Io(format!("Failed to write state file: {}", e)))
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource in the state
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Remove a resource from the state
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "emr_cluster")
    pub resource_type: String,
    pub name: String,
    /// Provider name (e.g., "aws")
    pub provider: String,
    /// Remote identity (cluster ID, ARN, window ID)
    pub identifier: String,
    /// Last observed attributes as JSON values
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: identifier.into(),
            attributes: HashMap::new(),
        }
    }

    /// Record the attributes of an observed state
    pub fn with_observed(mut self, state: &State) -> Self {
        self.attributes = state
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        self
    }
}
