//! Reconciler - Drive one resource's lifecycle against a Provider
//!
//! A Reconciler owns the remote identity and the last observed state of a
//! single resource. Observed state is replaced wholesale on every read and
//! discarded when the identity is cleared.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::differ::{Diff, diff};
use crate::error::ErrorKind;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State, Value};

/// What a reconciliation pass did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(State),
    Updated(State),
    /// Deleted and created again because a replacement-forcing attribute changed
    Replaced(State),
    Unchanged(State),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created(_) => "created",
            Outcome::Updated(_) => "updated",
            Outcome::Replaced(_) => "replaced",
            Outcome::Unchanged(_) => "unchanged",
        }
    }
}

/// Lifecycle driver for a single resource
pub struct Reconciler {
    provider: Arc<dyn Provider>,
    id: ResourceId,
    identifier: Option<String>,
    observed: Option<State>,
    /// Last desired configuration, handed to delete for operation settings
    config: HashMap<String, Value>,
    cancel: Cancellation,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn Provider>, id: ResourceId) -> Self {
        Self {
            provider,
            id,
            identifier: None,
            observed: None,
            config: HashMap::new(),
            cancel: Cancellation::never(),
        }
    }

    /// Resume from a previously recorded identity
    pub fn with_identifier(mut self, identifier: Option<String>) -> Self {
        self.identifier = identifier;
        self
    }

    /// Desired configuration to consult when only destroying
    pub fn with_config(mut self, config: HashMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn observed(&self) -> Option<&State> {
        self.observed.as_ref()
    }

    fn clear(&mut self) {
        self.identifier = None;
        self.observed = None;
    }

    /// Keep an identity reported by a failed operation so the next pass can find the object
    fn remember_identity(&mut self, err: &ProviderError) {
        if let Some(identifier) = &err.identifier {
            self.identifier = Some(identifier.clone());
        }
    }

    /// Refresh the observed state.
    ///
    /// Returns `None` when the object no longer exists; the identity is
    /// cleared so the next `reconcile` creates it again.
    pub async fn read(&mut self) -> ProviderResult<Option<&State>> {
        let Some(identifier) = self.identifier.clone() else {
            self.observed = None;
            return Ok(None);
        };

        let state = self
            .provider
            .read(&self.id, Some(&identifier), &self.cancel)
            .await?;

        if !state.exists || state.phase().is_some_and(|p| p.is_terminal()) {
            warn!("{} ({}) no longer exists, clearing identity", self.id, identifier);
            self.clear();
            return Ok(None);
        }

        if let Some(previous) = self.observed.as_ref().and_then(|s| s.phase())
            && let Some(next) = state.phase()
            && !previous.can_transition_to(next)
        {
            warn!(
                "{} moved from {} to {}, which is not a valid transition",
                self.id, previous, next
            );
        }

        if let Some(ref new_identifier) = state.identifier {
            self.identifier = Some(new_identifier.clone());
        }
        debug!("{} observed with status {:?}", self.id, state.status);
        self.observed = Some(state);
        Ok(self.observed.as_ref())
    }

    /// Converge the remote object onto `desired`
    pub async fn reconcile(&mut self, desired: &Resource) -> ProviderResult<Outcome> {
        let schema = self.provider.schema(&desired.id.resource_type).ok_or_else(|| {
            ProviderError::new(ErrorKind::Unsupported(format!(
                "unsupported resource type '{}'",
                desired.id.resource_type
            )))
            .for_resource(self.id.clone())
        })?;

        schema.validate(&desired.attributes).map_err(|errors| {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            ProviderError::new(ErrorKind::Config(message)).for_resource(self.id.clone())
        })?;

        self.config = desired.attributes.clone();
        self.read().await?;
        let current = self
            .observed
            .clone()
            .unwrap_or_else(|| State::not_found(self.id.clone()));

        match diff(desired, &current, &schema) {
            Diff::Create => {
                info!("Creating {}", self.id);
                let state = self.create(desired).await?;
                Ok(Outcome::Created(state))
            }
            Diff::NoChange => {
                debug!("{} is up to date", self.id);
                Ok(Outcome::Unchanged(current))
            }
            Diff::Update { changed } => {
                info!("Updating {} ({})", self.id, changed.join(", "));
                let Some(identifier) = self.identifier.clone() else {
                    return Err(ProviderError::new(ErrorKind::Unsupported(
                        "cannot update an object without an identity".to_string(),
                    ))
                    .for_resource(self.id.clone()));
                };
                let mut state = self
                    .provider
                    .update(&self.id, &identifier, &current, desired, &self.cancel)
                    .await?;
                if state.identifier.is_none() {
                    state.identifier = Some(identifier);
                }
                self.observed = Some(state.clone());
                Ok(Outcome::Updated(state))
            }
            Diff::Replace { forced_by, .. } => {
                info!(
                    "Replacing {} because {} changed",
                    self.id,
                    forced_by.join(", ")
                );
                self.destroy().await?;
                let state = self.create(desired).await?;
                Ok(Outcome::Replaced(state))
            }
        }
    }

    async fn create(&mut self, desired: &Resource) -> ProviderResult<State> {
        let state = match self.provider.create(desired, &self.cancel).await {
            Ok(state) => state,
            Err(e) => {
                self.remember_identity(&e);
                return Err(e);
            }
        };
        self.identifier = state.identifier.clone();
        self.observed = Some(state.clone());
        Ok(state)
    }

    /// Delete the remote object. An object without identity is already gone.
    pub async fn destroy(&mut self) -> ProviderResult<()> {
        let Some(identifier) = self.identifier.clone() else {
            debug!("{} has no identity, nothing to delete", self.id);
            self.observed = None;
            return Ok(());
        };

        info!("Deleting {} ({})", self.id, identifier);
        self.provider
            .delete(&self.id, &identifier, &self.config, &self.cancel)
            .await?;
        self.clear();
        Ok(())
    }
}
