//! EMR cluster lifecycle
//!
//! Create starts the cluster and waits until it can accept work. Updates
//! cover the few facets EMR can change in place: core group size,
//! visibility, termination protection and step concurrency. Everything
//! else replaces the cluster.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use cirrus_core::cancel::Cancellation;
use cirrus_core::differ::changed_attributes;
use cirrus_core::error::ErrorKind;
use cirrus_core::provider::ProviderResult;
use cirrus_core::refresh::{Observed, observe};
use cirrus_core::resource::{AttributesExt, Phase, Resource, ResourceId, State, Status, Value};
use cirrus_core::retry::{ErrorMatcher, ErrorTable, RetryPolicy};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use cirrus_core::timeouts::Timeouts;
use cirrus_core::wait::StateWaiter;

use super::{ClusterDescription, EmrApi, InstanceGroupDescription, RunClusterRequest};
use crate::utils::{optional_i32, provider_error, required_string, set_opt};

pub const RESOURCE_TYPE: &str = "emr_cluster";

pub const DEFAULT_TIMEOUTS: Timeouts = Timeouts::new(
    Duration::from_secs(75 * 60),
    Duration::from_secs(20 * 60),
    Duration::from_secs(20 * 60),
);

/// Instance profiles take a while to propagate after they are created
const CREATE_RETRYABLE: ErrorTable = ErrorTable::new(&[
    ErrorMatcher::new("ValidationException", "Invalid InstanceProfile:"),
    ErrorMatcher::new("AccessDeniedException", "Failed to authorize instance profile"),
    ErrorMatcher::code("ThrottlingException"),
]);
const CREATE_RETRY_BUDGET: Duration = Duration::from_secs(30);

const CLUSTER_NOT_FOUND: ErrorTable = ErrorTable::new(&[ErrorMatcher::code("ClusterNotFound")]);

const STARTING: &str = "STARTING";
const BOOTSTRAPPING: &str = "BOOTSTRAPPING";
const RUNNING: &str = "RUNNING";
const WAITING: &str = "WAITING";
const TERMINATING: &str = "TERMINATING";
const TERMINATED: &str = "TERMINATED";
const TERMINATED_WITH_ERRORS: &str = "TERMINATED_WITH_ERRORS";

/// Instance group type of the core nodes
const CORE: &str = "CORE";
const MASTER: &str = "MASTER";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Managed big-data cluster")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("release_label", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("service_role", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("instance_profile", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("subnet_id", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(AttributeSchema::new("key_name", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("log_uri", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("applications", types::string_list())
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("master_instance_type", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("core_instance_type", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("core_instance_count", types::positive_int()).computed())
        .attribute(
            AttributeSchema::new("termination_protection", AttributeType::Bool)
                .with_default(false),
        )
        .attribute(
            AttributeSchema::new("visible_to_all_users", AttributeType::Bool)
                .with_default(true),
        )
        .attribute(
            AttributeSchema::new("keep_job_flow_alive_when_no_steps", AttributeType::Bool)
                .with_default(true)
                .force_new(),
        )
        .attribute(AttributeSchema::new("step_concurrency_level", types::positive_int()).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("arn", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("cluster_state", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("master_public_dns", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("core_instance_group_id", AttributeType::String).read_only(),
        )
}

/// Build a RunJobFlow request from desired attributes
pub fn run_request(attrs: &HashMap<String, Value>) -> Result<RunClusterRequest, ErrorKind> {
    let core_instance_type = attrs.get_string("core_instance_type").map(str::to_string);
    let core_instance_count = optional_i32(attrs, "core_instance_count")?;
    if core_instance_count.is_some() && core_instance_type.is_none() {
        return Err(ErrorKind::config(
            "'core_instance_count' requires 'core_instance_type'",
        ));
    }

    Ok(RunClusterRequest {
        name: required_string(attrs, "name")?,
        release_label: required_string(attrs, "release_label")?,
        service_role: required_string(attrs, "service_role")?,
        instance_profile: attrs.get_string("instance_profile").map(str::to_string),
        subnet_id: attrs.get_string("subnet_id").map(str::to_string),
        key_name: attrs.get_string("key_name").map(str::to_string),
        log_uri: attrs.get_string("log_uri").map(str::to_string),
        applications: attrs.get_strings("applications").unwrap_or_default(),
        master_instance_type: required_string(attrs, "master_instance_type")?,
        core_instance_count: core_instance_type.as_ref().map(|_| core_instance_count.unwrap_or(1)),
        core_instance_type,
        termination_protection: attrs.get_bool_or("termination_protection", false),
        visible_to_all_users: attrs.get_bool_or("visible_to_all_users", true),
        keep_job_flow_alive_when_no_steps: attrs
            .get_bool_or("keep_job_flow_alive_when_no_steps", true),
        step_concurrency_level: optional_i32(attrs, "step_concurrency_level")?,
    })
}

/// Lifecycle phase of a cluster state
pub fn phase(state: &str) -> Phase {
    match state {
        STARTING => Phase::Pending,
        BOOTSTRAPPING => Phase::Bootstrapping,
        RUNNING | WAITING => Phase::Active,
        TERMINATING => Phase::Terminating,
        TERMINATED | TERMINATED_WITH_ERRORS => Phase::Terminated,
        _ => Phase::Pending,
    }
}

/// One observation of the cluster
async fn refresh(
    api: &dyn EmrApi,
    cluster_id: &str,
) -> Result<Observed<ClusterDescription>, ErrorKind> {
    let cluster = match api.describe_cluster(cluster_id).await {
        Ok(Some(cluster)) => cluster,
        Ok(None) => return Ok(Observed::Absent),
        Err(e) => return observe(Err(e), &CLUSTER_NOT_FOUND),
    };

    let state = cluster.state.clone();
    debug!("EMR cluster {} status: {:?}", cluster_id, state);

    let reason = match state.as_deref() {
        Some(TERMINATING | TERMINATED_WITH_ERRORS) => Some(
            cluster
                .state_reason
                .clone()
                .unwrap_or_else(|| "reason code and message not provided".to_string()),
        ),
        _ => cluster.state_reason.clone(),
    };
    Ok(Observed::from_status(cluster, state, "EMR cluster")?.with_reason(reason))
}

/// One observation of an instance group, found by ID
async fn refresh_instance_group(
    api: &dyn EmrApi,
    cluster_id: &str,
    group_id: &str,
) -> Result<Observed<InstanceGroupDescription>, ErrorKind> {
    let groups = match api.list_instance_groups(cluster_id).await {
        Ok(groups) => groups,
        Err(e) => return observe(Err(e), &CLUSTER_NOT_FOUND),
    };
    let Some(group) = groups.into_iter().find(|g| g.id == group_id) else {
        return Ok(Observed::Absent);
    };

    let state = group.state.clone();
    debug!("EMR instance group {} status: {:?}", group_id, state);
    Observed::from_status(group, state, "EMR instance group")
}

fn find_group<'a>(
    groups: &'a [InstanceGroupDescription],
    group_type: &str,
) -> Option<&'a InstanceGroupDescription> {
    groups.iter().find(|g| g.group_type == group_type)
}

fn attributes(
    cluster: &ClusterDescription,
    groups: &[InstanceGroupDescription],
) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("id".to_string(), Value::from(cluster.id.as_str()));
    set_opt(&mut attrs, "arn", cluster.arn.clone());
    set_opt(&mut attrs, "name", cluster.name.clone());
    set_opt(&mut attrs, "cluster_state", cluster.state.clone());
    set_opt(&mut attrs, "release_label", cluster.release_label.clone());
    set_opt(&mut attrs, "service_role", cluster.service_role.clone());
    set_opt(&mut attrs, "instance_profile", cluster.instance_profile.clone());
    set_opt(&mut attrs, "subnet_id", cluster.subnet_id.clone());
    set_opt(&mut attrs, "key_name", cluster.key_name.clone());
    set_opt(&mut attrs, "log_uri", cluster.log_uri.clone());
    set_opt(&mut attrs, "master_public_dns", cluster.master_public_dns.clone());
    set_opt(&mut attrs, "termination_protection", cluster.termination_protected);
    set_opt(&mut attrs, "visible_to_all_users", cluster.visible_to_all_users);
    set_opt(
        &mut attrs,
        "keep_job_flow_alive_when_no_steps",
        cluster.auto_terminate.map(|auto| !auto),
    );
    set_opt(&mut attrs, "step_concurrency_level", cluster.step_concurrency_level);
    if !cluster.applications.is_empty() {
        attrs.insert(
            "applications".to_string(),
            Value::List(
                cluster
                    .applications
                    .iter()
                    .map(|a| Value::from(a.as_str()))
                    .collect(),
            ),
        );
    }

    if let Some(master) = find_group(groups, MASTER) {
        set_opt(&mut attrs, "master_instance_type", master.instance_type.clone());
    }
    if let Some(core) = find_group(groups, CORE) {
        attrs.insert(
            "core_instance_group_id".to_string(),
            Value::from(core.id.as_str()),
        );
        set_opt(&mut attrs, "core_instance_type", core.instance_type.clone());
        set_opt(&mut attrs, "core_instance_count", core.requested_instance_count);
    }
    attrs
}

/// EMR cluster operations over an injected client
pub struct Clusters {
    api: Arc<dyn EmrApi>,
    final_attempt: bool,
}

impl Clusters {
    pub fn new(api: Arc<dyn EmrApi>) -> Self {
        Self {
            api,
            final_attempt: true,
        }
    }

    /// Whether the create retry makes one last attempt after its budget runs out
    pub fn with_final_attempt(mut self, enabled: bool) -> Self {
        self.final_attempt = enabled;
        self
    }

    pub async fn create(&self, resource: &Resource, cancel: &Cancellation) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = Timeouts::from_attributes(&resource.attributes, DEFAULT_TIMEOUTS)
            .map_err(|e| provider_error(id, "reading timeouts", e))?;
        let request = run_request(&resource.attributes)
            .map_err(|e| provider_error(id, "creating EMR cluster", e))?;
        debug!("EMR cluster create options: {:?}", request);

        let api = self.api.as_ref();
        let request = &request;
        let cluster_id = RetryPolicy::new(CREATE_RETRY_BUDGET)
            .with_final_attempt(self.final_attempt)
            .retry_remote(&CREATE_RETRYABLE, cancel, || api.run_job_flow(request))
            .await
            .map_err(|e| provider_error(id, "running EMR job flow", e))?;
        info!("Created EMR cluster: {}", cluster_id);

        info!("Waiting for EMR cluster {} to become available", cluster_id);
        let cluster = StateWaiter::new(&[STARTING, BOOTSTRAPPING], &[RUNNING, WAITING])
            .timeout(timeouts.create)
            .delay(Duration::from_secs(30))
            .min_interval(Duration::from_secs(10))
            .max_interval(Duration::from_secs(30))
            .wait(cancel, || refresh(api, &cluster_id))
            .await
            .map_err(|e| {
                provider_error(id, "waiting for EMR cluster", e).with_identifier(&cluster_id)
            })?;

        let observed = cluster.and_then(|c| c.termination_protected);
        if observed != Some(request.termination_protection) {
            debug!(
                "EMR cluster {} termination protection is {:?}, setting {}",
                cluster_id, observed, request.termination_protection
            );
            self.api
                .set_termination_protection(&cluster_id, request.termination_protection)
                .await
                .map_err(|e| {
                    provider_error(id, "setting termination protection", ErrorKind::Request(e))
                        .with_identifier(&cluster_id)
                })?;
        }

        self.read(id, &cluster_id, cancel)
            .await
            .map_err(|e| e.with_identifier(&cluster_id))
    }

    pub async fn read(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let context = |e| provider_error(id, "reading EMR cluster", e).with_identifier(cluster_id);
        cancel.check().map_err(context)?;

        let observed = refresh(self.api.as_ref(), cluster_id)
            .await
            .map_err(context)?;
        let Some(cluster) = observed.into_object() else {
            debug!("EMR cluster {} not found", cluster_id);
            return Ok(State::not_found(id.clone()));
        };

        let state = cluster.state.clone().unwrap_or_default();
        if matches!(state.as_str(), TERMINATED | TERMINATED_WITH_ERRORS) {
            warn!("EMR cluster {} was {} already", cluster_id, state);
            return Ok(State::not_found(id.clone()));
        }

        let groups = self
            .api
            .list_instance_groups(cluster_id)
            .await
            .map_err(|e| context(ErrorKind::Request(e)))?;

        Ok(State::existing(id.clone(), attributes(&cluster, &groups))
            .with_identifier(cluster_id)
            .with_status(Status::new(state.as_str(), phase(&state))))
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        from: &State,
        to: &Resource,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let fail = |context: &str, e: ErrorKind| {
            provider_error(id, context, e).with_identifier(cluster_id)
        };
        let timeouts = Timeouts::from_attributes(&to.attributes, DEFAULT_TIMEOUTS)
            .map_err(|e| fail("reading timeouts", e))?;
        let changed = changed_attributes(&to.attributes, &from.attributes, &schema());
        let api = self.api.as_ref();

        if let Some(other) = changed.iter().find(|name| {
            !matches!(
                name.as_str(),
                "core_instance_count"
                    | "visible_to_all_users"
                    | "termination_protection"
                    | "step_concurrency_level"
            )
        }) {
            return Err(fail(
                "updating EMR cluster",
                ErrorKind::Unsupported(format!("'{}' cannot be changed in place", other)),
            ));
        }

        if changed.iter().any(|n| n == "core_instance_count")
            && let Some(count) =
                optional_i32(&to.attributes, "core_instance_count").map_err(|e| fail("resizing", e))?
        {
            let group_id = match from.attributes.get_string("core_instance_group_id") {
                Some(group_id) => group_id.to_string(),
                None => {
                    let groups = api
                        .list_instance_groups(cluster_id)
                        .await
                        .map_err(|e| fail("listing instance groups", ErrorKind::Request(e)))?;
                    find_group(&groups, CORE).map(|g| g.id.clone()).ok_or_else(|| {
                        fail(
                            "resizing core instance group",
                            ErrorKind::Unsupported("cluster has no core instance group".to_string()),
                        )
                    })?
                }
            };

            info!("Resizing EMR core instance group {} to {}", group_id, count);
            cancel.check().map_err(|e| fail("resizing", e))?;
            api.modify_instance_group_count(cluster_id, &group_id, count)
                .await
                .map_err(|e| fail("modifying instance group", ErrorKind::Request(e)))?;

            StateWaiter::new(
                &["BOOTSTRAPPING", "PROVISIONING", "RECONFIGURING", "RESIZING"],
                &[RUNNING],
            )
            .timeout(timeouts.update)
            .delay(Duration::from_secs(10))
            .min_interval(Duration::from_secs(10))
            .max_interval(Duration::from_secs(30))
            .wait(cancel, || refresh_instance_group(api, cluster_id, &group_id))
            .await
            .map_err(|e| fail("waiting for core instance group", e))?;
        }

        if changed.iter().any(|n| n == "visible_to_all_users") {
            let visible = to.attributes.get_bool_or("visible_to_all_users", true);
            cancel.check().map_err(|e| fail("updating", e))?;
            api.set_visible_to_all_users(cluster_id, visible)
                .await
                .map_err(|e| fail("setting visible_to_all_users", ErrorKind::Request(e)))?;
        }

        if changed.iter().any(|n| n == "termination_protection") {
            let protected = to.attributes.get_bool_or("termination_protection", false);
            cancel.check().map_err(|e| fail("updating", e))?;
            api.set_termination_protection(cluster_id, protected)
                .await
                .map_err(|e| fail("setting termination protection", ErrorKind::Request(e)))?;
        }

        if changed.iter().any(|n| n == "step_concurrency_level")
            && let Some(level) = optional_i32(&to.attributes, "step_concurrency_level")
                .map_err(|e| fail("updating", e))?
        {
            cancel.check().map_err(|e| fail("updating", e))?;
            api.set_step_concurrency_level(cluster_id, level)
                .await
                .map_err(|e| fail("modifying step concurrency level", ErrorKind::Request(e)))?;
        }

        self.read(id, cluster_id, cancel).await
    }

    pub async fn delete(
        &self,
        id: &ResourceId,
        cluster_id: &str,
        attributes: &HashMap<String, Value>,
        cancel: &Cancellation,
    ) -> ProviderResult<()> {
        let fail = |context: &str, e: ErrorKind| {
            provider_error(id, context, e).with_identifier(cluster_id)
        };
        let timeouts = Timeouts::from_attributes(attributes, DEFAULT_TIMEOUTS)
            .map_err(|e| fail("reading timeouts", e))?;
        let api = self.api.as_ref();

        cancel.check().map_err(|e| fail("terminating EMR cluster", e))?;
        match api.terminate_job_flow(cluster_id).await {
            Ok(()) => {}
            Err(e) if CLUSTER_NOT_FOUND.matches(&e) => {
                debug!("EMR cluster {} already gone", cluster_id);
                return Ok(());
            }
            Err(e) => return Err(fail("terminating EMR cluster", ErrorKind::Request(e))),
        }

        info!("Waiting for EMR cluster {} to terminate", cluster_id);
        StateWaiter::new(
            &[STARTING, BOOTSTRAPPING, RUNNING, WAITING, TERMINATING],
            &[],
        )
        .absent(&[TERMINATED, TERMINATED_WITH_ERRORS])
        .timeout(timeouts.delete)
        .min_interval(Duration::from_secs(10))
        .max_interval(Duration::from_secs(30))
        .wait(cancel, || refresh(api, cluster_id))
        .await
        .map_err(|e| fail("waiting for EMR cluster termination", e))?;

        info!("EMR cluster {} terminated", cluster_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emr::fake::FakeEmr;
    use cirrus_core::cancel::cancellation;
    use cirrus_core::error::RemoteError;
    use tokio::time::Instant;

    fn cluster(state: &str) -> ClusterDescription {
        ClusterDescription {
            id: "j-2AXXXXXXGAPLF".to_string(),
            arn: Some("arn:aws:elasticmapreduce:us-east-1:123456789012:cluster/j-2AXXXXXXGAPLF".to_string()),
            name: Some("analytics".to_string()),
            state: Some(state.to_string()),
            release_label: Some("emr-6.15.0".to_string()),
            service_role: Some("EMR_DefaultRole".to_string()),
            instance_profile: Some("EMR_EC2_DefaultRole".to_string()),
            applications: vec!["Spark".to_string()],
            termination_protected: Some(false),
            visible_to_all_users: Some(true),
            auto_terminate: Some(false),
            step_concurrency_level: Some(1),
            ..Default::default()
        }
    }

    fn groups(core_state: &str, count: i32) -> Vec<InstanceGroupDescription> {
        vec![
            InstanceGroupDescription {
                id: "ig-MASTER".to_string(),
                group_type: MASTER.to_string(),
                instance_type: Some("m5.xlarge".to_string()),
                requested_instance_count: Some(1),
                state: Some(RUNNING.to_string()),
            },
            InstanceGroupDescription {
                id: "ig-CORE".to_string(),
                group_type: CORE.to_string(),
                instance_type: Some("m5.xlarge".to_string()),
                requested_instance_count: Some(count),
                state: Some(core_state.to_string()),
            },
        ]
    }

    fn desired() -> Resource {
        Resource::new(RESOURCE_TYPE, "analytics")
            .with_attribute("name", "analytics")
            .with_attribute("release_label", "emr-6.15.0")
            .with_attribute("service_role", "EMR_DefaultRole")
            .with_attribute("instance_profile", "EMR_EC2_DefaultRole")
            .with_attribute("master_instance_type", "m5.xlarge")
            .with_attribute("core_instance_type", "m5.xlarge")
            .with_attribute("core_instance_count", 2)
            .with_attribute("applications", Value::List(vec![Value::from("Spark")]))
    }

    fn clusters(fake: &Arc<FakeEmr>) -> Clusters {
        Clusters::new(fake.clone())
    }

    #[test]
    fn run_request_from_attributes() {
        let request = run_request(&desired().attributes).unwrap();
        assert_eq!(request.name, "analytics");
        assert_eq!(request.core_instance_count, Some(2));
        assert_eq!(request.applications, vec!["Spark".to_string()]);
        assert!(request.visible_to_all_users);
        assert!(request.keep_job_flow_alive_when_no_steps);
        assert!(!request.termination_protection);
    }

    #[test]
    fn core_count_without_type_is_rejected() {
        let mut attrs = desired().attributes;
        attrs.remove("core_instance_type");
        assert!(matches!(run_request(&attrs), Err(ErrorKind::Config(_))));
    }

    #[test]
    fn phases_of_cluster_states() {
        assert_eq!(phase(STARTING), Phase::Pending);
        assert_eq!(phase(WAITING), Phase::Active);
        assert_eq!(phase(TERMINATED_WITH_ERRORS), Phase::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_until_running() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(STARTING)));
        fake.push_describe(Some(cluster(BOOTSTRAPPING)));
        fake.push_describe(Some(cluster(BOOTSTRAPPING)));
        fake.push_describe(Some(cluster(RUNNING)));
        fake.push_groups(groups(RUNNING, 2));

        let started = Instant::now();
        let state = clusters(&fake)
            .create(&desired(), &Cancellation::never())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30 + 10 + 20 + 30));
        assert_eq!(state.identifier.as_deref(), Some("j-2AXXXXXXGAPLF"));
        assert_eq!(state.status, Some(Status::new(RUNNING, Phase::Active)));
        assert_eq!(state.attributes.get_int("core_instance_count"), Some(2));
        assert_eq!(
            state.attributes.get_string("core_instance_group_id"),
            Some("ig-CORE")
        );
        assert_eq!(fake.calls(), vec!["RunJobFlow".to_string()]);
        // four polls while waiting plus the final read
        assert_eq!(*fake.describe_calls.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_instance_profile_propagation() {
        let fake = Arc::new(FakeEmr::default());
        for _ in 0..2 {
            fake.run_errors.lock().unwrap().push_back(RemoteError::new(
                "ValidationException",
                "Invalid InstanceProfile: EMR_EC2_DefaultRole.",
            ));
        }
        fake.push_describe(Some(cluster(WAITING)));

        clusters(&fake)
            .create(&desired(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(fake.run_requests.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn create_fails_fast_on_other_validation_errors() {
        let fake = Arc::new(FakeEmr::default());
        fake.run_errors.lock().unwrap().push_back(RemoteError::new(
            "ValidationException",
            "The requested instance type is not supported",
        ));

        let err = clusters(&fake)
            .create(&desired(), &Cancellation::never())
            .await
            .unwrap_err();

        assert!(matches!(err.kind, ErrorKind::Request(_)));
        assert_eq!(err.identifier, None);
        assert_eq!(fake.run_requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_reports_terminating_cluster_with_reason() {
        let fake = Arc::new(FakeEmr::default());
        let mut failing = cluster(TERMINATING);
        failing.state_reason = Some("VALIDATION_ERROR: The subnet does not exist".to_string());
        fake.push_describe(Some(cluster(STARTING)));
        fake.push_describe(Some(failing));

        let err = clusters(&fake)
            .create(&desired(), &Cancellation::never())
            .await
            .unwrap_err();

        assert_eq!(err.identifier.as_deref(), Some("j-2AXXXXXXGAPLF"));
        match err.kind {
            ErrorKind::UnexpectedStatus { status, reason } => {
                assert_eq!(status, TERMINATING);
                assert_eq!(
                    reason.as_deref(),
                    Some("VALIDATION_ERROR: The subnet does not exist")
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_times_out_after_configured_budget() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(BOOTSTRAPPING)));

        let mut timeouts = HashMap::new();
        timeouts.insert("create".to_string(), Value::from("5m"));
        let resource = desired().with_attribute("timeouts", Value::Map(timeouts));

        let started = Instant::now();
        let err = clusters(&fake)
            .create(&resource, &Cancellation::never())
            .await
            .unwrap_err();

        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(matches!(
            err.kind,
            ErrorKind::WaitTimeout { ref last_status, .. } if last_status.as_deref() == Some(BOOTSTRAPPING)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn create_fixes_termination_protection_once() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(WAITING)));
        let resource = desired().with_attribute("termination_protection", true);

        clusters(&fake)
            .create(&resource, &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "RunJobFlow".to_string(),
                "SetTerminationProtection true".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn read_treats_terminated_cluster_as_gone() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(TERMINATED)));
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");

        let state = clusters(&fake)
            .read(&id, "j-2AXXXXXXGAPLF", &Cancellation::never())
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn read_treats_not_found_error_as_gone() {
        let fake = Arc::new(FakeEmr::default());
        fake.describes
            .lock()
            .unwrap()
            .push_back(Err(RemoteError::new("ClusterNotFound", "no such cluster")));
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");

        let state = clusters(&fake)
            .read(&id, "j-2AXXXXXXGAPLF", &Cancellation::never())
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn read_without_status_is_an_error() {
        let fake = Arc::new(FakeEmr::default());
        let mut described = cluster(RUNNING);
        described.state = None;
        fake.push_describe(Some(described));
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");

        let err = clusters(&fake)
            .read(&id, "j-2AXXXXXXGAPLF", &Cancellation::never())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::StatusMissing { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn update_resizes_core_group_and_waits() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(WAITING)));
        fake.push_groups(groups("RESIZING", 4));
        fake.push_groups(groups(RUNNING, 4));

        let id = ResourceId::new(RESOURCE_TYPE, "analytics");
        let clusters = clusters(&fake);
        let mut current = cluster(WAITING);
        current.visible_to_all_users = Some(true);
        let from = State::existing(id.clone(), attributes(&current, &groups(RUNNING, 2)));
        let to = desired().with_attribute("core_instance_count", 4);

        let state = clusters
            .update(&id, "j-2AXXXXXXGAPLF", &from, &to, &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(fake.calls(), vec!["ModifyInstanceGroups ig-CORE=4".to_string()]);
        assert_eq!(state.attributes.get_int("core_instance_count"), Some(4));
    }

    #[tokio::test]
    async fn update_applies_synchronous_facets() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(WAITING)));
        fake.push_groups(groups(RUNNING, 2));

        let id = ResourceId::new(RESOURCE_TYPE, "analytics");
        let from = State::existing(id.clone(), attributes(&cluster(WAITING), &groups(RUNNING, 2)));
        let to = desired()
            .with_attribute("visible_to_all_users", false)
            .with_attribute("termination_protection", true)
            .with_attribute("step_concurrency_level", 5);

        clusters(&fake)
            .update(&id, "j-2AXXXXXXGAPLF", &from, &to, &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "SetVisibleToAllUsers false".to_string(),
                "SetTerminationProtection true".to_string(),
                "ModifyCluster 5".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn update_rejects_replacement_attributes() {
        let fake = Arc::new(FakeEmr::default());
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");
        let from = State::existing(id.clone(), attributes(&cluster(WAITING), &groups(RUNNING, 2)));
        let to = desired().with_attribute("release_label", "emr-7.0.0");

        let err = clusters(&fake)
            .update(&id, "j-2AXXXXXXGAPLF", &from, &to, &Cancellation::never())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Unsupported(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_waits_for_termination() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(TERMINATING)));
        fake.push_describe(Some(cluster(TERMINATING)));
        fake.push_describe(Some(cluster(TERMINATED)));
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");

        clusters(&fake)
            .delete(&id, "j-2AXXXXXXGAPLF", &HashMap::new(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(fake.calls(), vec!["TerminateJobFlows".to_string()]);
        assert_eq!(*fake.describe_calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_of_missing_cluster_succeeds() {
        let fake = Arc::new(FakeEmr::default());
        *fake.terminate_error.lock().unwrap() =
            Some(RemoteError::new("ClusterNotFound", "no such cluster"));
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");

        clusters(&fake)
            .delete(&id, "j-2AXXXXXXGAPLF", &HashMap::new(), &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(*fake.describe_calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_delete_stops_polling() {
        let fake = Arc::new(FakeEmr::default());
        fake.push_describe(Some(cluster(TERMINATING)));
        let id = ResourceId::new(RESOURCE_TYPE, "analytics");
        let (handle, cancel) = cancellation();

        let clusters = clusters(&fake);
        let properties = HashMap::new();
        let deleting = clusters.delete(&id, "j-2AXXXXXXGAPLF", &properties, &cancel);
        let cancelling = async {
            tokio::time::sleep(Duration::from_secs(15)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(deleting, cancelling);

        assert!(result.unwrap_err().is_cancelled());
        // first poll at 0s, second at 10s, cancelled during the following sleep
        assert_eq!(*fake.describe_calls.lock().unwrap(), 2);
    }
}
