//! EMR - Remote client boundary for managed big-data clusters
//!
//! `EmrApi` is the typed surface the cluster lifecycle drives. It is
//! implemented for the SDK client in `sdk` and by in-memory fakes in tests.

pub mod cluster;
mod sdk;

use async_trait::async_trait;
use cirrus_core::error::RemoteError;

pub use cluster::Clusters;

/// Parameters of a RunJobFlow call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunClusterRequest {
    pub name: String,
    pub release_label: String,
    pub service_role: String,
    pub instance_profile: Option<String>,
    pub subnet_id: Option<String>,
    pub key_name: Option<String>,
    pub log_uri: Option<String>,
    pub applications: Vec<String>,
    pub master_instance_type: String,
    pub core_instance_type: Option<String>,
    pub core_instance_count: Option<i32>,
    pub termination_protection: bool,
    pub visible_to_all_users: bool,
    pub keep_job_flow_alive_when_no_steps: bool,
    pub step_concurrency_level: Option<i32>,
}

/// Cluster as returned by DescribeCluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterDescription {
    pub id: String,
    pub arn: Option<String>,
    pub name: Option<String>,
    /// Cluster state (e.g., "BOOTSTRAPPING"); `None` when the response omits it
    pub state: Option<String>,
    /// State-change reason formatted as "CODE: message"
    pub state_reason: Option<String>,
    pub release_label: Option<String>,
    pub service_role: Option<String>,
    pub instance_profile: Option<String>,
    pub subnet_id: Option<String>,
    pub key_name: Option<String>,
    pub log_uri: Option<String>,
    pub applications: Vec<String>,
    pub termination_protected: Option<bool>,
    pub visible_to_all_users: Option<bool>,
    pub auto_terminate: Option<bool>,
    pub step_concurrency_level: Option<i32>,
    pub master_public_dns: Option<String>,
}

/// Instance group as returned by ListInstanceGroups
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceGroupDescription {
    pub id: String,
    /// "MASTER", "CORE" or "TASK"
    pub group_type: String,
    pub instance_type: Option<String>,
    pub requested_instance_count: Option<i32>,
    pub state: Option<String>,
}

#[async_trait]
pub trait EmrApi: Send + Sync {
    /// Start a cluster, returning its ID
    async fn run_job_flow(&self, request: &RunClusterRequest) -> Result<String, RemoteError>;

    /// `None` when the response carries no cluster
    async fn describe_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Option<ClusterDescription>, RemoteError>;

    async fn list_instance_groups(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<InstanceGroupDescription>, RemoteError>;

    async fn modify_instance_group_count(
        &self,
        cluster_id: &str,
        instance_group_id: &str,
        count: i32,
    ) -> Result<(), RemoteError>;

    async fn set_termination_protection(
        &self,
        cluster_id: &str,
        protected: bool,
    ) -> Result<(), RemoteError>;

    async fn set_visible_to_all_users(
        &self,
        cluster_id: &str,
        visible: bool,
    ) -> Result<(), RemoteError>;

    async fn set_step_concurrency_level(
        &self,
        cluster_id: &str,
        level: i32,
    ) -> Result<(), RemoteError>;

    async fn terminate_job_flow(&self, cluster_id: &str) -> Result<(), RemoteError>;
}
