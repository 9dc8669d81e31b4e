//! `CloudTrailApi` over the AWS SDK client

use async_trait::async_trait;
use aws_sdk_cloudtrail::Client;
use cirrus_core::error::RemoteError;

use super::{
    CloudTrailApi, CreateEventDataStoreRequest, EventDataStoreDescription,
    UpdateEventDataStoreRequest,
};
use crate::utils::remote_error;

#[async_trait]
impl CloudTrailApi for Client {
    async fn create_event_data_store(
        &self,
        request: &CreateEventDataStoreRequest,
    ) -> Result<String, RemoteError> {
        let resp = self
            .create_event_data_store()
            .name(&request.name)
            .set_kms_key_id(request.kms_key_id.clone())
            .multi_region_enabled(request.multi_region_enabled)
            .organization_enabled(request.organization_enabled)
            .retention_period(request.retention_period)
            .termination_protection_enabled(request.termination_protection_enabled)
            .send()
            .await
            .map_err(remote_error)?;

        resp.event_data_store_arn()
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::new(
                    "InvalidResponse",
                    "CreateEventDataStore returned no event data store ARN",
                )
            })
    }

    async fn get_event_data_store(
        &self,
        arn: &str,
    ) -> Result<EventDataStoreDescription, RemoteError> {
        let resp = self
            .get_event_data_store()
            .event_data_store(arn)
            .send()
            .await
            .map_err(remote_error)?;

        let multi_region_enabled: Option<bool> = resp.multi_region_enabled().into();
        let organization_enabled: Option<bool> = resp.organization_enabled().into();
        let retention_period: Option<i32> = resp.retention_period().into();
        let termination_protection_enabled: Option<bool> =
            resp.termination_protection_enabled().into();

        Ok(EventDataStoreDescription {
            arn: resp.event_data_store_arn().unwrap_or(arn).to_string(),
            name: resp.name().map(str::to_string),
            status: resp.status().map(|s| s.as_str().to_string()),
            kms_key_id: resp.kms_key_id().map(str::to_string),
            multi_region_enabled,
            organization_enabled,
            retention_period,
            termination_protection_enabled,
        })
    }

    async fn update_event_data_store(
        &self,
        request: &UpdateEventDataStoreRequest,
    ) -> Result<(), RemoteError> {
        self.update_event_data_store()
            .event_data_store(&request.arn)
            .set_multi_region_enabled(request.multi_region_enabled)
            .set_organization_enabled(request.organization_enabled)
            .set_retention_period(request.retention_period)
            .set_termination_protection_enabled(request.termination_protection_enabled)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_event_data_store(&self, arn: &str) -> Result<(), RemoteError> {
        self.delete_event_data_store()
            .event_data_store(arn)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }
}
