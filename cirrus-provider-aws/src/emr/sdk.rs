//! `EmrApi` over the AWS SDK client

use async_trait::async_trait;
use aws_sdk_emr::Client;
use aws_sdk_emr::types::{
    Application, Cluster, InstanceGroup, InstanceGroupConfig, InstanceGroupModifyConfig,
    InstanceRoleType, JobFlowInstancesConfig,
};
use cirrus_core::error::RemoteError;

use super::{ClusterDescription, EmrApi, InstanceGroupDescription, RunClusterRequest};
use crate::utils::remote_error;

fn build_error(err: aws_sdk_emr::error::BuildError) -> RemoteError {
    RemoteError::new("InvalidRequest", err.to_string())
}

fn instances_config(request: &RunClusterRequest) -> Result<JobFlowInstancesConfig, RemoteError> {
    let master = InstanceGroupConfig::builder()
        .instance_role(InstanceRoleType::Master)
        .instance_type(&request.master_instance_type)
        .instance_count(1)
        .build();

    let mut config = JobFlowInstancesConfig::builder()
        .keep_job_flow_alive_when_no_steps(request.keep_job_flow_alive_when_no_steps)
        .termination_protected(request.termination_protection)
        .set_ec2_subnet_id(request.subnet_id.clone())
        .set_ec2_key_name(request.key_name.clone())
        .instance_groups(master);

    if let (Some(instance_type), Some(count)) =
        (&request.core_instance_type, request.core_instance_count)
    {
        let core = InstanceGroupConfig::builder()
            .instance_role(InstanceRoleType::Core)
            .instance_type(instance_type)
            .instance_count(count)
            .build();
        config = config.instance_groups(core);
    }

    Ok(config.build())
}

fn describe(cluster: &Cluster, cluster_id: &str) -> ClusterDescription {
    let status = cluster.status();
    let state_reason = status.and_then(|s| s.state_change_reason()).and_then(|r| {
        match (r.code().map(|c| c.as_str()), r.message()) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
            (Some(code), None) => Some(code.to_string()),
            (None, Some(message)) => Some(message.to_string()),
            (None, None) => None,
        }
    });
    let ec2 = cluster.ec2_instance_attributes();

    let termination_protected: Option<bool> = cluster.termination_protected().into();
    let visible_to_all_users: Option<bool> = cluster.visible_to_all_users().into();
    let auto_terminate: Option<bool> = cluster.auto_terminate().into();
    let step_concurrency_level: Option<i32> = cluster.step_concurrency_level().into();

    ClusterDescription {
        id: cluster.id().unwrap_or(cluster_id).to_string(),
        arn: cluster.cluster_arn().map(str::to_string),
        name: cluster.name().map(str::to_string),
        state: status
            .and_then(|s| s.state())
            .map(|s| s.as_str().to_string()),
        state_reason,
        release_label: cluster.release_label().map(str::to_string),
        service_role: cluster.service_role().map(str::to_string),
        instance_profile: ec2
            .and_then(|e| e.iam_instance_profile())
            .map(str::to_string),
        subnet_id: ec2.and_then(|e| e.ec2_subnet_id()).map(str::to_string),
        key_name: ec2.and_then(|e| e.ec2_key_name()).map(str::to_string),
        log_uri: cluster.log_uri().map(str::to_string),
        applications: cluster
            .applications()
            .iter()
            .filter_map(|a| a.name().map(str::to_string))
            .collect(),
        termination_protected,
        visible_to_all_users,
        auto_terminate,
        step_concurrency_level,
        master_public_dns: cluster.master_public_dns_name().map(str::to_string),
    }
}

fn instance_group(group: &InstanceGroup) -> InstanceGroupDescription {
    InstanceGroupDescription {
        id: group.id().unwrap_or_default().to_string(),
        group_type: group
            .instance_group_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        instance_type: group.instance_type().map(str::to_string),
        requested_instance_count: group.requested_instance_count(),
        state: group
            .status()
            .and_then(|s| s.state())
            .map(|s| s.as_str().to_string()),
    }
}

#[async_trait]
impl EmrApi for Client {
    async fn run_job_flow(&self, request: &RunClusterRequest) -> Result<String, RemoteError> {
        let mut req = self
            .run_job_flow()
            .name(&request.name)
            .release_label(&request.release_label)
            .service_role(&request.service_role)
            .set_job_flow_role(request.instance_profile.clone())
            .set_log_uri(request.log_uri.clone())
            .visible_to_all_users(request.visible_to_all_users)
            .set_step_concurrency_level(request.step_concurrency_level)
            .instances(instances_config(request)?);

        for name in &request.applications {
            req = req.applications(Application::builder().name(name).build());
        }

        let resp = req.send().await.map_err(remote_error)?;
        resp.job_flow_id()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::new("InvalidResponse", "RunJobFlow returned no cluster ID"))
    }

    async fn describe_cluster(
        &self,
        cluster_id: &str,
    ) -> Result<Option<ClusterDescription>, RemoteError> {
        let resp = self
            .describe_cluster()
            .cluster_id(cluster_id)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(resp.cluster().map(|c| describe(c, cluster_id)))
    }

    async fn list_instance_groups(
        &self,
        cluster_id: &str,
    ) -> Result<Vec<InstanceGroupDescription>, RemoteError> {
        let mut groups = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let resp = self
                .list_instance_groups()
                .cluster_id(cluster_id)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(remote_error)?;
            groups.extend(resp.instance_groups().iter().map(instance_group));
            match resp.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(groups)
    }

    async fn modify_instance_group_count(
        &self,
        cluster_id: &str,
        instance_group_id: &str,
        count: i32,
    ) -> Result<(), RemoteError> {
        let config = InstanceGroupModifyConfig::builder()
            .instance_group_id(instance_group_id)
            .instance_count(count)
            .build();
        self.modify_instance_groups()
            .cluster_id(cluster_id)
            .instance_groups(config)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn set_termination_protection(
        &self,
        cluster_id: &str,
        protected: bool,
    ) -> Result<(), RemoteError> {
        self.set_termination_protection()
            .job_flow_ids(cluster_id)
            .termination_protected(protected)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn set_visible_to_all_users(
        &self,
        cluster_id: &str,
        visible: bool,
    ) -> Result<(), RemoteError> {
        self.set_visible_to_all_users()
            .job_flow_ids(cluster_id)
            .visible_to_all_users(visible)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn set_step_concurrency_level(
        &self,
        cluster_id: &str,
        level: i32,
    ) -> Result<(), RemoteError> {
        self.modify_cluster()
            .cluster_id(cluster_id)
            .step_concurrency_level(level)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn terminate_job_flow(&self, cluster_id: &str) -> Result<(), RemoteError> {
        self.terminate_job_flows()
            .job_flow_ids(cluster_id)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }
}
