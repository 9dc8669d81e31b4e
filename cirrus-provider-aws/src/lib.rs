//! Cirrus AWS Provider
//!
//! Lifecycles for EMR clusters, CloudTrail event data stores and SSM
//! maintenance windows, built on the reconciliation engine in `cirrus-core`.
//!
//! ## Module Structure
//!
//! - `emr`, `cloudtrail`, `ssm` - Remote client boundaries and per-resource lifecycles
//! - `provider` - AwsProvider implementation
//! - `resources` - Resource type definitions
//! - `config` - Provider settings
//! - `utils` - Helper functions for value normalization and error conversion

pub mod cloudtrail;
pub mod config;
pub mod emr;
pub mod provider;
pub mod resources;
pub mod ssm;
pub mod utils;

// Re-export main types
pub use config::ProviderConfig;
pub use provider::AwsProvider;
pub use utils::normalize_region;

use std::collections::HashMap;

use cirrus_core::cancel::Cancellation;
use cirrus_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use cirrus_core::resource::{Resource, ResourceId, State, Value};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: Option<&'a str>,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_resource(id, identifier, cancel))
    }

    fn create<'a>(
        &'a self,
        resource: &'a Resource,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.create_resource(resource, cancel))
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.update_resource(id, identifier, from, to, cancel))
    }

    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        attributes: &'a HashMap<String, Value>,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_resource(id, identifier, attributes, cancel))
    }
}
