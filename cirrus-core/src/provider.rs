//! Provider - Trait abstracting resource lifecycle operations
//!
//! A Provider maps resource types onto a vendor's management API. Each
//! operation drives the remote call and any wait it implies, observing the
//! given cancellation between remote calls.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::cancel::Cancellation;
use crate::error::ErrorKind;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub resource_id: Option<ResourceId>,
    /// Remote identity the operation was acting on, if known
    pub identifier: Option<String>,
    /// What the provider was doing when the error occurred
    pub context: Option<String>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] ", id.resource_type, id.name)?;
        }
        if let Some(ref context) = self.context {
            write!(f, "{}", context)?;
            if let Some(ref identifier) = self.identifier {
                write!(f, " ({})", identifier)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for ProviderError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl ProviderError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            resource_id: None,
            identifier: None,
            context: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "emr_cluster")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// All operations are async and involve side effects. Absence of the remote
/// object is reported as `State::not_found`, never as an error.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "aws")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Schema of a resource type, if this Provider handles it
    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.resource_types()
            .into_iter()
            .find(|t| t.name() == resource_type)
            .map(|t| t.schema())
    }

    /// Get the current state of a resource
    ///
    /// Without an identifier there is nothing to look up and the resource is
    /// reported as not found.
    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: Option<&'a str>,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Create a resource and wait until it is usable
    ///
    /// Returns State with identifier set to the remote identity (ARN, cluster ID)
    fn create<'a>(
        &'a self,
        resource: &'a Resource,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Apply in-place changes from `from` to `to`
    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Delete a resource and wait for it to disappear
    ///
    /// `attributes` is the last known configuration, possibly empty; it is
    /// only consulted for operation settings such as timeouts. Deleting an
    /// object that is already gone succeeds.
    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        attributes: &'a HashMap<String, Value>,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: Option<&'a str>,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).read(id, identifier, cancel)
    }

    fn create<'a>(
        &'a self,
        resource: &'a Resource,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).create(resource, cancel)
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        (**self).update(id, identifier, from, to, cancel)
    }

    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        attributes: &'a HashMap<String, Value>,
        cancel: &'a Cancellation,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).delete(id, identifier, attributes, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::schema::{AttributeSchema, AttributeType};

    // Mock Provider for testing
    struct MockProvider;

    struct MockType;

    impl ResourceType for MockType {
        fn name(&self) -> &'static str {
            "mock_thing"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("mock_thing")
                .attribute(AttributeSchema::new("name", AttributeType::String))
        }
    }

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![Box::new(MockType)]
        }

        fn read<'a>(
            &'a self,
            id: &'a ResourceId,
            _identifier: Option<&'a str>,
            _cancel: &'a Cancellation,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            Box::pin(async move { Ok(State::not_found(id.clone())) })
        }

        fn create<'a>(
            &'a self,
            resource: &'a Resource,
            _cancel: &'a Cancellation,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs).with_identifier("mock-id-123")) })
        }

        fn update<'a>(
            &'a self,
            id: &'a ResourceId,
            _identifier: &'a str,
            _from: &'a State,
            to: &'a Resource,
            _cancel: &'a Cancellation,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs)) })
        }

        fn delete<'a>(
            &'a self,
            _id: &'a ResourceId,
            _identifier: &'a str,
            _attributes: &'a HashMap<String, Value>,
            _cancel: &'a Cancellation,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider = MockProvider;
        let id = ResourceId::new("mock_thing", "example");
        let state = provider
            .read(&id, None, &Cancellation::never())
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let resource = Resource::new("mock_thing", "example");
        let state = provider
            .create(&resource, &Cancellation::never())
            .await
            .unwrap();
        assert!(state.exists);
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[test]
    fn schema_lookup_by_type_name() {
        let provider = MockProvider;
        assert!(provider.schema("mock_thing").is_some());
        assert!(provider.schema("emr_cluster").is_none());
    }

    #[test]
    fn provider_error_display_includes_context() {
        let err = ProviderError::new(ErrorKind::Request(RemoteError::new(
            "ValidationException",
            "Invalid release label",
        )))
        .for_resource(ResourceId::new("emr_cluster", "main"))
        .with_identifier("j-2AXXXXXXGAPLF")
        .context("modifying instance group");

        assert_eq!(
            err.to_string(),
            "[emr_cluster.main] modifying instance group (j-2AXXXXXXGAPLF): ValidationException: Invalid release label"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
