//! CloudTrail event data store lifecycle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use cirrus_core::cancel::Cancellation;
use cirrus_core::differ::changed_attributes;
use cirrus_core::error::ErrorKind;
use cirrus_core::provider::ProviderResult;
use cirrus_core::refresh::{Observed, observe};
use cirrus_core::resource::{AttributesExt, Phase, Resource, ResourceId, State, Status, Value};
use cirrus_core::retry::{ErrorMatcher, ErrorTable, RetryPolicy, THROTTLING};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use cirrus_core::timeouts::Timeouts;
use cirrus_core::wait::StateWaiter;

use super::{
    CloudTrailApi, CreateEventDataStoreRequest, EventDataStoreDescription,
    UpdateEventDataStoreRequest,
};
use crate::utils::{optional_i32, provider_error, required_string, set_opt};

pub const RESOURCE_TYPE: &str = "cloudtrail_event_data_store";

pub const DEFAULT_TIMEOUTS: Timeouts = Timeouts::new(
    Duration::from_secs(5 * 60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(5 * 60),
);

const NOT_FOUND: ErrorTable =
    ErrorTable::new(&[ErrorMatcher::code("EventDataStoreNotFoundException")]);

const CREATED: &str = "CREATED";
const ENABLED: &str = "ENABLED";
const PENDING_DELETION: &str = "PENDING_DELETION";

const DEFAULT_RETENTION_PERIOD: i32 = 2555;

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("CloudTrail Lake event data store")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("kms_key_id", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("multi_region_enabled", AttributeType::Bool)
                .with_default(true),
        )
        .attribute(
            AttributeSchema::new("organization_enabled", AttributeType::Bool)
                .with_default(false),
        )
        .attribute(
            AttributeSchema::new("retention_period", types::positive_int())
                .with_default(DEFAULT_RETENTION_PERIOD),
        )
        .attribute(
            AttributeSchema::new("termination_protection_enabled", AttributeType::Bool)
                .with_default(true),
        )
        .attribute(AttributeSchema::new("arn", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("status", AttributeType::String).read_only())
}

pub fn create_request(
    attrs: &HashMap<String, Value>,
) -> Result<CreateEventDataStoreRequest, ErrorKind> {
    Ok(CreateEventDataStoreRequest {
        name: required_string(attrs, "name")?,
        kms_key_id: attrs.get_string("kms_key_id").map(str::to_string),
        multi_region_enabled: attrs.get_bool_or("multi_region_enabled", true),
        organization_enabled: attrs.get_bool_or("organization_enabled", false),
        retention_period: optional_i32(attrs, "retention_period")?
            .unwrap_or(DEFAULT_RETENTION_PERIOD),
        termination_protection_enabled: attrs.get_bool_or("termination_protection_enabled", true),
    })
}

/// Update request carrying only the attributes in `changed`
pub fn update_request(
    arn: &str,
    attrs: &HashMap<String, Value>,
    changed: &[String],
) -> Result<UpdateEventDataStoreRequest, ErrorKind> {
    let has = |name: &str| changed.iter().any(|c| c == name);
    let mut request = UpdateEventDataStoreRequest {
        arn: arn.to_string(),
        ..Default::default()
    };

    if has("multi_region_enabled") {
        request.multi_region_enabled = Some(attrs.get_bool_or("multi_region_enabled", true));
    }
    if has("organization_enabled") {
        request.organization_enabled = Some(attrs.get_bool_or("organization_enabled", false));
    }
    if has("retention_period") {
        request.retention_period = Some(
            optional_i32(attrs, "retention_period")?.unwrap_or(DEFAULT_RETENTION_PERIOD),
        );
    }
    if has("termination_protection_enabled") {
        request.termination_protection_enabled =
            Some(attrs.get_bool_or("termination_protection_enabled", true));
    }
    Ok(request)
}

pub fn phase(status: &str) -> Phase {
    match status {
        CREATED => Phase::Pending,
        PENDING_DELETION => Phase::Terminating,
        _ => Phase::Active,
    }
}

/// One observation; stores pending deletion count as gone
async fn refresh(
    api: &dyn CloudTrailApi,
    arn: &str,
) -> Result<Observed<EventDataStoreDescription>, ErrorKind> {
    let store = match api.get_event_data_store(arn).await {
        Ok(store) => store,
        Err(e) => return observe(Err(e), &NOT_FOUND),
    };
    debug!("CloudTrail event data store {} status: {:?}", arn, store.status);

    if store.status.as_deref() == Some(PENDING_DELETION) {
        return Ok(Observed::Absent);
    }
    let status = store.status.clone();
    Observed::from_status(store, status, "CloudTrail event data store")
}

fn attributes(store: &EventDataStoreDescription) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("arn".to_string(), Value::from(store.arn.as_str()));
    set_opt(&mut attrs, "name", store.name.clone());
    set_opt(&mut attrs, "status", store.status.clone());
    set_opt(&mut attrs, "kms_key_id", store.kms_key_id.clone());
    set_opt(&mut attrs, "multi_region_enabled", store.multi_region_enabled);
    set_opt(&mut attrs, "organization_enabled", store.organization_enabled);
    set_opt(&mut attrs, "retention_period", store.retention_period);
    set_opt(
        &mut attrs,
        "termination_protection_enabled",
        store.termination_protection_enabled,
    );
    attrs
}

/// CloudTrail event data store operations over an injected client
pub struct EventDataStores {
    api: Arc<dyn CloudTrailApi>,
    final_attempt: bool,
}

impl EventDataStores {
    pub fn new(api: Arc<dyn CloudTrailApi>) -> Self {
        Self {
            api,
            final_attempt: true,
        }
    }

    pub fn with_final_attempt(mut self, enabled: bool) -> Self {
        self.final_attempt = enabled;
        self
    }

    fn wait_available(&self, timeout: Duration) -> StateWaiter {
        StateWaiter::new(&[CREATED], &[ENABLED]).timeout(timeout)
    }

    pub async fn create(&self, resource: &Resource, cancel: &Cancellation) -> ProviderResult<State> {
        let id = &resource.id;
        let timeouts = Timeouts::from_attributes(&resource.attributes, DEFAULT_TIMEOUTS)
            .map_err(|e| provider_error(id, "reading timeouts", e))?;
        let request = create_request(&resource.attributes)
            .map_err(|e| provider_error(id, "creating CloudTrail event data store", e))?;
        debug!("CloudTrail event data store create options: {:?}", request);

        let api = self.api.as_ref();
        let request = &request;
        let arn = RetryPolicy::new(Duration::from_secs(30))
            .with_final_attempt(self.final_attempt)
            .retry_remote(&ErrorTable::new(THROTTLING), cancel, || {
                api.create_event_data_store(request)
            })
            .await
            .map_err(|e| provider_error(id, "creating CloudTrail event data store", e))?;
        info!("Created CloudTrail event data store: {}", arn);

        self.wait_available(timeouts.create)
            .wait(cancel, || refresh(api, &arn))
            .await
            .map_err(|e| {
                provider_error(id, "waiting for CloudTrail event data store", e)
                    .with_identifier(&arn)
            })?;

        self.read(id, &arn, cancel)
            .await
            .map_err(|e| e.with_identifier(&arn))
    }

    pub async fn read(
        &self,
        id: &ResourceId,
        arn: &str,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let context = |e| {
            provider_error(id, "reading CloudTrail event data store", e).with_identifier(arn)
        };
        cancel.check().map_err(context)?;

        let observed = refresh(self.api.as_ref(), arn).await.map_err(context)?;
        let Some(store) = observed.into_object() else {
            debug!("CloudTrail event data store {} not found", arn);
            return Ok(State::not_found(id.clone()));
        };

        let status = store.status.clone().unwrap_or_default();
        Ok(State::existing(id.clone(), attributes(&store))
            .with_identifier(arn)
            .with_status(Status::new(status.as_str(), phase(&status))))
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        arn: &str,
        from: &State,
        to: &Resource,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let fail = |context: &str, e: ErrorKind| provider_error(id, context, e).with_identifier(arn);
        let timeouts = Timeouts::from_attributes(&to.attributes, DEFAULT_TIMEOUTS)
            .map_err(|e| fail("reading timeouts", e))?;

        let changed = changed_attributes(&to.attributes, &from.attributes, &schema());
        if !changed.is_empty() {
            let request = update_request(arn, &to.attributes, &changed)
                .map_err(|e| fail("updating CloudTrail event data store", e))?;
            debug!("CloudTrail event data store update options: {:?}", request);

            cancel.check().map_err(|e| fail("updating", e))?;
            self.api
                .update_event_data_store(&request)
                .await
                .map_err(|e| fail("updating CloudTrail event data store", ErrorKind::Request(e)))?;

            let api = self.api.as_ref();
            self.wait_available(timeouts.update)
                .wait(cancel, || refresh(api, arn))
                .await
                .map_err(|e| fail("waiting for CloudTrail event data store", e))?;
        }

        self.read(id, arn, cancel).await
    }

    pub async fn delete(
        &self,
        id: &ResourceId,
        arn: &str,
        attributes: &HashMap<String, Value>,
        cancel: &Cancellation,
    ) -> ProviderResult<()> {
        let fail = |context: &str, e: ErrorKind| provider_error(id, context, e).with_identifier(arn);
        let timeouts = Timeouts::from_attributes(attributes, DEFAULT_TIMEOUTS)
            .map_err(|e| fail("reading timeouts", e))?;

        cancel.check().map_err(|e| fail("deleting", e))?;
        match self.api.delete_event_data_store(arn).await {
            Ok(()) => {}
            Err(e) if NOT_FOUND.matches(&e) => {
                debug!("CloudTrail event data store {} already gone", arn);
                return Ok(());
            }
            Err(e) => {
                return Err(fail(
                    "deleting CloudTrail event data store",
                    ErrorKind::Request(e),
                ));
            }
        }

        let api = self.api.as_ref();
        StateWaiter::new(&[CREATED, ENABLED], &[])
            .timeout(timeouts.delete)
            .wait(cancel, || refresh(api, arn))
            .await
            .map_err(|e| fail("waiting for CloudTrail event data store deletion", e))?;
        info!("Deleted CloudTrail event data store: {}", arn);
        Ok(())
    }
}
