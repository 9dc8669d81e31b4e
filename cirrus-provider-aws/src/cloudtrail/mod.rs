//! CloudTrail - Remote client boundary for event data stores

pub mod event_data_store;
mod sdk;

use async_trait::async_trait;
use cirrus_core::error::RemoteError;

pub use event_data_store::EventDataStores;

/// Parameters of a CreateEventDataStore call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateEventDataStoreRequest {
    pub name: String,
    pub kms_key_id: Option<String>,
    pub multi_region_enabled: bool,
    pub organization_enabled: bool,
    pub retention_period: i32,
    pub termination_protection_enabled: bool,
}

/// Parameters of an UpdateEventDataStore call; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateEventDataStoreRequest {
    pub arn: String,
    pub multi_region_enabled: Option<bool>,
    pub organization_enabled: Option<bool>,
    pub retention_period: Option<i32>,
    pub termination_protection_enabled: Option<bool>,
}

/// Event data store as returned by GetEventDataStore
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDataStoreDescription {
    pub arn: String,
    pub name: Option<String>,
    /// e.g. "CREATED", "ENABLED", "PENDING_DELETION"
    pub status: Option<String>,
    pub kms_key_id: Option<String>,
    pub multi_region_enabled: Option<bool>,
    pub organization_enabled: Option<bool>,
    pub retention_period: Option<i32>,
    pub termination_protection_enabled: Option<bool>,
}

#[async_trait]
pub trait CloudTrailApi: Send + Sync {
    /// Create an event data store, returning its ARN
    async fn create_event_data_store(
        &self,
        request: &CreateEventDataStoreRequest,
    ) -> Result<String, RemoteError>;

    async fn get_event_data_store(&self, arn: &str)
    -> Result<EventDataStoreDescription, RemoteError>;

    async fn update_event_data_store(
        &self,
        request: &UpdateEventDataStoreRequest,
    ) -> Result<(), RemoteError>;

    async fn delete_event_data_store(&self, arn: &str) -> Result<(), RemoteError>;
}
