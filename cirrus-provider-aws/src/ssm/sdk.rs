//! `SsmApi` over the AWS SDK client

use async_trait::async_trait;
use aws_sdk_ssm::Client;
use cirrus_core::error::RemoteError;

use super::{CreateWindowRequest, SsmApi, UpdateWindowRequest, WindowDescription};
use crate::utils::remote_error;

#[async_trait]
impl SsmApi for Client {
    async fn create_maintenance_window(
        &self,
        request: &CreateWindowRequest,
    ) -> Result<String, RemoteError> {
        let resp = self
            .create_maintenance_window()
            .name(&request.name)
            .schedule(&request.schedule)
            .duration(request.duration)
            .cutoff(request.cutoff)
            .allow_unassociated_targets(request.allow_unassociated_targets)
            .set_description(request.description.clone())
            .set_start_date(request.start_date.clone())
            .set_end_date(request.end_date.clone())
            .set_schedule_timezone(request.schedule_timezone.clone())
            .set_schedule_offset(request.schedule_offset)
            .send()
            .await
            .map_err(remote_error)?;

        resp.window_id().map(str::to_string).ok_or_else(|| {
            RemoteError::new(
                "InvalidResponse",
                "CreateMaintenanceWindow returned no window ID",
            )
        })
    }

    async fn get_maintenance_window(
        &self,
        window_id: &str,
    ) -> Result<WindowDescription, RemoteError> {
        let resp = self
            .get_maintenance_window()
            .window_id(window_id)
            .send()
            .await
            .map_err(remote_error)?;

        let duration: Option<i32> = resp.duration().into();
        let cutoff: Option<i32> = resp.cutoff().into();
        let allow_unassociated_targets: Option<bool> = resp.allow_unassociated_targets().into();
        let enabled: Option<bool> = resp.enabled().into();
        let schedule_offset: Option<i32> = resp.schedule_offset().into();

        Ok(WindowDescription {
            id: resp.window_id().unwrap_or(window_id).to_string(),
            name: resp.name().map(str::to_string),
            schedule: resp.schedule().map(str::to_string),
            duration,
            cutoff,
            allow_unassociated_targets,
            enabled,
            description: resp.description().map(str::to_string),
            start_date: resp.start_date().map(str::to_string),
            end_date: resp.end_date().map(str::to_string),
            schedule_timezone: resp.schedule_timezone().map(str::to_string),
            schedule_offset,
        })
    }

    async fn update_maintenance_window(
        &self,
        request: &UpdateWindowRequest,
    ) -> Result<(), RemoteError> {
        self.update_maintenance_window()
            .window_id(&request.window_id)
            .set_name(request.name.clone())
            .set_schedule(request.schedule.clone())
            .set_duration(request.duration)
            .set_cutoff(request.cutoff)
            .set_allow_unassociated_targets(request.allow_unassociated_targets)
            .set_enabled(request.enabled)
            .set_description(request.description.clone())
            .set_start_date(request.start_date.clone())
            .set_end_date(request.end_date.clone())
            .set_schedule_timezone(request.schedule_timezone.clone())
            .set_schedule_offset(request.schedule_offset)
            .set_replace(request.replace.then_some(true))
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn delete_maintenance_window(&self, window_id: &str) -> Result<(), RemoteError> {
        self.delete_maintenance_window()
            .window_id(window_id)
            .send()
            .await
            .map_err(remote_error)?;
        Ok(())
    }
}
