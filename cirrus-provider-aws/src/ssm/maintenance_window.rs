//! SSM maintenance window lifecycle
//!
//! Windows have no status; every operation completes synchronously.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use cirrus_core::cancel::Cancellation;
use cirrus_core::differ::changed_attributes;
use cirrus_core::error::ErrorKind;
use cirrus_core::provider::ProviderResult;
use cirrus_core::resource::{AttributesExt, Resource, ResourceId, State, Value};
use cirrus_core::retry::{ErrorMatcher, ErrorTable, RetryPolicy, THROTTLING};
use cirrus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{CreateWindowRequest, SsmApi, UpdateWindowRequest, WindowDescription};
use crate::utils::{optional_i32, provider_error, required_string, set_opt};

pub const RESOURCE_TYPE: &str = "ssm_maintenance_window";

const NOT_FOUND: ErrorTable = ErrorTable::new(&[ErrorMatcher::code("DoesNotExistException")]);

/// Attributes the vendor clears only when asked to replace the whole window
const OPTIONAL: &[&str] = &[
    "description",
    "start_date",
    "end_date",
    "schedule_timezone",
    "schedule_offset",
];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Systems Manager maintenance window")
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("schedule", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("duration", types::positive_int())
                .required()
                .with_description("Window length in hours"),
        )
        .attribute(
            AttributeSchema::new("cutoff", AttributeType::Int)
                .required()
                .with_description("Hours before the end of the window to stop scheduling tasks"),
        )
        .attribute(
            AttributeSchema::new("allow_unassociated_targets", AttributeType::Bool)
                .with_default(false),
        )
        .attribute(AttributeSchema::new("enabled", AttributeType::Bool).with_default(true))
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new("start_date", AttributeType::String))
        .attribute(AttributeSchema::new("end_date", AttributeType::String))
        .attribute(AttributeSchema::new("schedule_timezone", AttributeType::String))
        .attribute(AttributeSchema::new("schedule_offset", AttributeType::Int))
        .attribute(AttributeSchema::new("id", AttributeType::String).read_only())
}

fn optional_string(attrs: &HashMap<String, Value>, key: &str) -> Option<String> {
    attrs.get_string(key).map(str::to_string)
}

fn required_i32(attrs: &HashMap<String, Value>, key: &str) -> Result<i32, ErrorKind> {
    optional_i32(attrs, key)?.ok_or_else(|| ErrorKind::config(format!("'{}' is required", key)))
}

pub fn create_request(attrs: &HashMap<String, Value>) -> Result<CreateWindowRequest, ErrorKind> {
    Ok(CreateWindowRequest {
        name: required_string(attrs, "name")?,
        schedule: required_string(attrs, "schedule")?,
        duration: required_i32(attrs, "duration")?,
        cutoff: required_i32(attrs, "cutoff")?,
        allow_unassociated_targets: attrs.get_bool_or("allow_unassociated_targets", false),
        description: optional_string(attrs, "description"),
        start_date: optional_string(attrs, "start_date"),
        end_date: optional_string(attrs, "end_date"),
        schedule_timezone: optional_string(attrs, "schedule_timezone"),
        schedule_offset: optional_i32(attrs, "schedule_offset")?,
    })
}

/// Update request for the attributes in `changed`.
///
/// Removing an optional attribute needs a replacing update, which must carry
/// the full configuration.
pub fn update_request(
    window_id: &str,
    attrs: &HashMap<String, Value>,
    changed: &[String],
) -> Result<UpdateWindowRequest, ErrorKind> {
    let replace = changed
        .iter()
        .any(|name| OPTIONAL.contains(&name.as_str()) && !attrs.contains_key(name));
    let has = |name: &str| replace || changed.iter().any(|c| c == name);

    let mut request = UpdateWindowRequest {
        window_id: window_id.to_string(),
        replace,
        ..Default::default()
    };
    if has("name") {
        request.name = Some(required_string(attrs, "name")?);
    }
    if has("schedule") {
        request.schedule = Some(required_string(attrs, "schedule")?);
    }
    if has("duration") {
        request.duration = Some(required_i32(attrs, "duration")?);
    }
    if has("cutoff") {
        request.cutoff = Some(required_i32(attrs, "cutoff")?);
    }
    if has("allow_unassociated_targets") {
        request.allow_unassociated_targets =
            Some(attrs.get_bool_or("allow_unassociated_targets", false));
    }
    if has("enabled") {
        request.enabled = Some(attrs.get_bool_or("enabled", true));
    }
    if has("description") {
        request.description = optional_string(attrs, "description");
    }
    if has("start_date") {
        request.start_date = optional_string(attrs, "start_date");
    }
    if has("end_date") {
        request.end_date = optional_string(attrs, "end_date");
    }
    if has("schedule_timezone") {
        request.schedule_timezone = optional_string(attrs, "schedule_timezone");
    }
    if has("schedule_offset") {
        request.schedule_offset = optional_i32(attrs, "schedule_offset")?;
    }
    Ok(request)
}

fn attributes(window: &WindowDescription) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    attrs.insert("id".to_string(), Value::from(window.id.as_str()));
    set_opt(&mut attrs, "name", window.name.clone());
    set_opt(&mut attrs, "schedule", window.schedule.clone());
    set_opt(&mut attrs, "duration", window.duration);
    set_opt(&mut attrs, "cutoff", window.cutoff);
    set_opt(
        &mut attrs,
        "allow_unassociated_targets",
        window.allow_unassociated_targets,
    );
    set_opt(&mut attrs, "enabled", window.enabled);
    set_opt(&mut attrs, "description", window.description.clone());
    set_opt(&mut attrs, "start_date", window.start_date.clone());
    set_opt(&mut attrs, "end_date", window.end_date.clone());
    set_opt(&mut attrs, "schedule_timezone", window.schedule_timezone.clone());
    set_opt(&mut attrs, "schedule_offset", window.schedule_offset);
    attrs
}

/// SSM maintenance window operations over an injected client
pub struct MaintenanceWindows {
    api: Arc<dyn SsmApi>,
    final_attempt: bool,
}

impl MaintenanceWindows {
    pub fn new(api: Arc<dyn SsmApi>) -> Self {
        Self {
            api,
            final_attempt: true,
        }
    }

    pub fn with_final_attempt(mut self, enabled: bool) -> Self {
        self.final_attempt = enabled;
        self
    }

    pub async fn create(&self, resource: &Resource, cancel: &Cancellation) -> ProviderResult<State> {
        let id = &resource.id;
        let request = create_request(&resource.attributes)
            .map_err(|e| provider_error(id, "creating SSM maintenance window", e))?;
        debug!("SSM maintenance window create options: {:?}", request);

        let api = self.api.as_ref();
        let request = &request;
        let window_id = RetryPolicy::new(Duration::from_secs(30))
            .with_final_attempt(self.final_attempt)
            .retry_remote(&ErrorTable::new(THROTTLING), cancel, || {
                api.create_maintenance_window(request)
            })
            .await
            .map_err(|e| provider_error(id, "creating SSM maintenance window", e))?;
        info!("Created SSM maintenance window: {}", window_id);

        if !resource.attributes.get_bool_or("enabled", true) {
            let disable = UpdateWindowRequest {
                window_id: window_id.clone(),
                enabled: Some(false),
                ..Default::default()
            };
            cancel.check().map_err(|e| {
                provider_error(id, "disabling SSM maintenance window", e)
                    .with_identifier(&window_id)
            })?;
            api.update_maintenance_window(&disable).await.map_err(|e| {
                provider_error(id, "disabling SSM maintenance window", ErrorKind::Request(e))
                    .with_identifier(&window_id)
            })?;
        }

        self.read(id, &window_id, cancel)
            .await
            .map_err(|e| e.with_identifier(&window_id))
    }

    pub async fn read(
        &self,
        id: &ResourceId,
        window_id: &str,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let context = |e| {
            provider_error(id, "reading SSM maintenance window", e).with_identifier(window_id)
        };
        cancel.check().map_err(context)?;

        match self.api.get_maintenance_window(window_id).await {
            Ok(window) => {
                Ok(State::existing(id.clone(), attributes(&window)).with_identifier(window_id))
            }
            Err(e) if NOT_FOUND.matches(&e) => {
                debug!("SSM maintenance window {} not found", window_id);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(context(ErrorKind::Request(e))),
        }
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        window_id: &str,
        from: &State,
        to: &Resource,
        cancel: &Cancellation,
    ) -> ProviderResult<State> {
        let fail = |context: &str, e: ErrorKind| {
            provider_error(id, context, e).with_identifier(window_id)
        };

        let changed = changed_attributes(&to.attributes, &from.attributes, &schema());
        if !changed.is_empty() {
            let request = update_request(window_id, &to.attributes, &changed)
                .map_err(|e| fail("updating SSM maintenance window", e))?;
            debug!("SSM maintenance window update options: {:?}", request);

            cancel.check().map_err(|e| fail("updating", e))?;
            self.api
                .update_maintenance_window(&request)
                .await
                .map_err(|e| fail("updating SSM maintenance window", ErrorKind::Request(e)))?;
        }

        self.read(id, window_id, cancel).await
    }

    pub async fn delete(
        &self,
        id: &ResourceId,
        window_id: &str,
        cancel: &Cancellation,
    ) -> ProviderResult<()> {
        let fail = |e: ErrorKind| {
            provider_error(id, "deleting SSM maintenance window", e).with_identifier(window_id)
        };
        cancel.check().map_err(fail)?;

        match self.api.delete_maintenance_window(window_id).await {
            Ok(()) => {
                info!("Deleted SSM maintenance window: {}", window_id);
                Ok(())
            }
            Err(e) if NOT_FOUND.matches(&e) => {
                debug!("SSM maintenance window {} already gone", window_id);
                Ok(())
            }
            Err(e) => Err(fail(ErrorKind::Request(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssm::fake::{FakeSsm, WINDOW_ID};

    fn desired() -> Resource {
        Resource::new(RESOURCE_TYPE, "patching")
            .with_attribute("name", "patching")
            .with_attribute("schedule", "cron(0 2 ? * SUN *)")
            .with_attribute("duration", 3)
            .with_attribute("cutoff", 1)
    }

    fn windows(fake: &Arc<FakeSsm>) -> MaintenanceWindows {
        MaintenanceWindows::new(fake.clone())
    }

    fn id() -> ResourceId {
        ResourceId::new(RESOURCE_TYPE, "patching")
    }

    #[test]
    fn create_request_requires_cutoff() {
        let mut attrs = desired().attributes;
        attrs.remove("cutoff");
        let err = create_request(&attrs).unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: 'cutoff' is required");
    }

    #[test]
    fn changed_fields_only_without_removals() {
        let attrs = desired().with_attribute("duration", 4).attributes;
        let request = update_request(WINDOW_ID, &attrs, &["duration".to_string()]).unwrap();
        assert_eq!(
            request,
            UpdateWindowRequest {
                window_id: WINDOW_ID.to_string(),
                duration: Some(4),
                ..Default::default()
            }
        );
    }

    #[test]
    fn removal_replaces_with_full_configuration() {
        let attrs = desired().attributes;
        let request =
            update_request(WINDOW_ID, &attrs, &["start_date".to_string()]).unwrap();
        assert!(request.replace);
        assert_eq!(request.name.as_deref(), Some("patching"));
        assert_eq!(request.cutoff, Some(1));
        assert_eq!(request.enabled, Some(true));
        assert_eq!(request.start_date, None);
    }

    #[tokio::test]
    async fn create_reads_back_window() {
        let fake = Arc::new(FakeSsm::default());
        let state = windows(&fake)
            .create(&desired(), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(state.identifier.as_deref(), Some(WINDOW_ID));
        assert_eq!(state.status, None);
        assert_eq!(state.attributes.get_bool("enabled"), Some(true));
        assert!(fake.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_disabled_window_makes_one_corrective_update() {
        let fake = Arc::new(FakeSsm::default());
        let resource = desired().with_attribute("enabled", false);

        let state = windows(&fake)
            .create(&resource, &Cancellation::never())
            .await
            .unwrap();

        let updates = fake.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].enabled, Some(false));
        assert_eq!(state.attributes.get_bool("enabled"), Some(false));
    }

    #[tokio::test]
    async fn read_missing_window_is_not_found() {
        let fake = Arc::new(FakeSsm::default());
        let state = windows(&fake)
            .read(&id(), WINDOW_ID, &Cancellation::never())
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn update_removing_description_clears_it() {
        let fake = Arc::new(FakeSsm::default());
        let windows = windows(&fake);
        let created = windows
            .create(
                &desired().with_attribute("description", "nightly"),
                &Cancellation::never(),
            )
            .await
            .unwrap();

        let state = windows
            .update(&id(), WINDOW_ID, &created, &desired(), &Cancellation::never())
            .await
            .unwrap();

        assert!(fake.updates.lock().unwrap()[0].replace);
        assert_eq!(state.attributes.get_string("description"), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let fake = Arc::new(FakeSsm::default());
        let windows = windows(&fake);
        windows
            .create(&desired(), &Cancellation::never())
            .await
            .unwrap();

        windows
            .delete(&id(), WINDOW_ID, &Cancellation::never())
            .await
            .unwrap();
        windows
            .delete(&id(), WINDOW_ID, &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(*fake.deletes.lock().unwrap(), 2);
    }
}
