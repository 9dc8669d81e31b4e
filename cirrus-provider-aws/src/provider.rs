//! AWS Provider implementation
//!
//! Owns one lifecycle per resource type, each over an injected service
//! client, and dispatches Provider operations by resource type.

use std::collections::HashMap;
use std::sync::Arc;

use aws_config::Region;
use cirrus_core::cancel::Cancellation;
use cirrus_core::error::ErrorKind;
use cirrus_core::provider::{ProviderError, ProviderResult};
use cirrus_core::resource::{Resource, ResourceId, State, Value};
use log::debug;

use crate::cloudtrail::{CloudTrailApi, EventDataStores, event_data_store};
use crate::config::ProviderConfig;
use crate::emr::{Clusters, EmrApi, cluster};
use crate::ssm::{MaintenanceWindows, SsmApi, maintenance_window};

/// AWS Provider
pub struct AwsProvider {
    clusters: Clusters,
    event_data_stores: EventDataStores,
    maintenance_windows: MaintenanceWindows,
}

impl AwsProvider {
    /// Create a new AwsProvider using the default credential chain
    pub async fn new(config: &ProviderConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        debug!("Loaded AWS configuration for region {}", config.region);

        Self::with_clients(
            Arc::new(aws_sdk_emr::Client::new(&sdk_config)),
            Arc::new(aws_sdk_cloudtrail::Client::new(&sdk_config)),
            Arc::new(aws_sdk_ssm::Client::new(&sdk_config)),
            config,
        )
    }

    /// Create with specific clients (for testing)
    pub fn with_clients(
        emr: Arc<dyn EmrApi>,
        cloudtrail: Arc<dyn CloudTrailApi>,
        ssm: Arc<dyn SsmApi>,
        config: &ProviderConfig,
    ) -> Self {
        let final_attempt = config.retry_final_attempt;
        Self {
            clusters: Clusters::new(emr).with_final_attempt(final_attempt),
            event_data_stores: EventDataStores::new(cloudtrail).with_final_attempt(final_attempt),
            maintenance_windows: MaintenanceWindows::new(ssm).with_final_attempt(final_attempt),
        }
    }

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        match id.resource_type.as_str() {
            cluster::RESOURCE_TYPE => self.clusters.read(id, identifier, cancel).await,
            event_data_store::RESOURCE_TYPE => {
                self.event_data_stores.read(id, identifier, cancel).await
            }
            maintenance_window::RESOURCE_TYPE => {
                self.maintenance_windows.read(id, identifier, cancel).await
            }
            other => Err(unsupported(id, other)),
        }
    }

    pub async fn create_resource(
        &self,
        resource: &Resource,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        match resource.id.resource_type.as_str() {
            cluster::RESOURCE_TYPE => self.clusters.create(resource, cancel).await,
            event_data_store::RESOURCE_TYPE => self.event_data_stores.create(resource, cancel).await,
            maintenance_window::RESOURCE_TYPE => {
                self.maintenance_windows.create(resource, cancel).await
            }
            other => Err(unsupported(&resource.id, other)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            cluster::RESOURCE_TYPE => {
                self.clusters
                    .update(id, identifier, from, to, cancel)
                    .await
            }
            event_data_store::RESOURCE_TYPE => {
                self.event_data_stores
                    .update(id, identifier, from, to, cancel)
                    .await
            }
            maintenance_window::RESOURCE_TYPE => {
                self.maintenance_windows
                    .update(id, identifier, from, to, cancel)
                    .await
            }
            other => Err(unsupported(id, other)),
        }
    }

    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        attributes: &HashMap<String, Value>,
        cancel: &Cancellation,
    ) -> ProviderResult<()> {
        match id.resource_type.as_str() {
            cluster::RESOURCE_TYPE => {
                self.clusters
                    .delete(id, identifier, attributes, cancel)
                    .await
            }
            event_data_store::RESOURCE_TYPE => {
                self.event_data_stores
                    .delete(id, identifier, attributes, cancel)
                    .await
            }
            maintenance_window::RESOURCE_TYPE => {
                self.maintenance_windows
                    .delete(id, identifier, cancel)
                    .await
            }
            other => Err(unsupported(id, other)),
        }
    }
}

fn unsupported(id: &ResourceId, resource_type: &str) -> ProviderError {
    ProviderError::new(ErrorKind::Unsupported(format!(
        "unsupported resource type '{}'",
        resource_type
    )))
    .for_resource(id.clone())
}
