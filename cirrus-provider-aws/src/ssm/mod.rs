//! SSM - Remote client boundary for maintenance windows

pub mod maintenance_window;
mod sdk;

use async_trait::async_trait;
use cirrus_core::error::RemoteError;

pub use maintenance_window::MaintenanceWindows;

/// Parameters of a CreateMaintenanceWindow call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateWindowRequest {
    pub name: String,
    pub schedule: String,
    pub duration: i32,
    pub cutoff: i32,
    pub allow_unassociated_targets: bool,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub schedule_timezone: Option<String>,
    pub schedule_offset: Option<i32>,
}

/// Parameters of an UpdateMaintenanceWindow call
///
/// With `replace` set, optional fields left as `None` are cleared on the
/// window; otherwise they are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateWindowRequest {
    pub window_id: String,
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub duration: Option<i32>,
    pub cutoff: Option<i32>,
    pub allow_unassociated_targets: Option<bool>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub schedule_timezone: Option<String>,
    pub schedule_offset: Option<i32>,
    pub replace: bool,
}

/// Maintenance window as returned by GetMaintenanceWindow
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowDescription {
    pub id: String,
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub duration: Option<i32>,
    pub cutoff: Option<i32>,
    pub allow_unassociated_targets: Option<bool>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub schedule_timezone: Option<String>,
    pub schedule_offset: Option<i32>,
}

#[async_trait]
pub trait SsmApi: Send + Sync {
    /// Create a maintenance window, returning its ID
    async fn create_maintenance_window(
        &self,
        request: &CreateWindowRequest,
    ) -> Result<String, RemoteError>;

    async fn get_maintenance_window(&self, window_id: &str)
    -> Result<WindowDescription, RemoteError>;

    async fn update_maintenance_window(
        &self,
        request: &UpdateWindowRequest,
    ) -> Result<(), RemoteError>;

    async fn delete_maintenance_window(&self, window_id: &str) -> Result<(), RemoteError>;
}
