//! Utility functions for value normalization and error conversion

use std::collections::HashMap;

use aws_sdk_emr::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use cirrus_core::error::{ErrorKind, RemoteError};
use cirrus_core::provider::ProviderError;
use cirrus_core::resource::{AttributesExt, ResourceId, Value};

/// Normalize region value (e.g., "aws.Region.ap_northeast_1" -> "ap-northeast-1")
pub fn normalize_region(s: &str) -> String {
    let region_part = if s.contains('.') {
        s.split('.').next_back().unwrap_or(s)
    } else {
        s
    };
    region_part.replace('_', "-")
}

/// Convert an SDK error into a code and message pair.
///
/// `SdkError` and `ProvideErrorMetadata` are shared by every service crate,
/// so this works for EMR, CloudTrail and SSM errors alike. Failures that
/// never reached the service (dispatch, timeouts) get the code
/// `RequestFailure`.
pub(crate) fn remote_error<E, R>(err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    match err.as_service_error() {
        Some(service) => RemoteError::new(
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or_default(),
        ),
        None => RemoteError::new("RequestFailure", DisplayErrorContext(&err).to_string()),
    }
}

/// Attach resource context to an engine error
pub(crate) fn provider_error(id: &ResourceId, context: &str, kind: ErrorKind) -> ProviderError {
    ProviderError::new(kind)
        .for_resource(id.clone())
        .context(context)
}

/// Required string attribute
pub(crate) fn required_string(
    attrs: &HashMap<String, Value>,
    key: &str,
) -> Result<String, ErrorKind> {
    attrs
        .get_string(key)
        .map(str::to_string)
        .ok_or_else(|| ErrorKind::config(format!("'{}' is required", key)))
}

/// Optional integer attribute narrowed to the SDK's i32
pub(crate) fn optional_i32(
    attrs: &HashMap<String, Value>,
    key: &str,
) -> Result<Option<i32>, ErrorKind> {
    attrs
        .get_int(key)
        .map(|n| {
            i32::try_from(n).map_err(|_| ErrorKind::config(format!("'{}' is out of range", key)))
        })
        .transpose()
}

/// Insert `value` under `key` when present
pub(crate) fn set_opt<T: Into<Value>>(
    attrs: &mut HashMap<String, Value>,
    key: &str,
    value: Option<T>,
) {
    if let Some(v) = value {
        attrs.insert(key.to_string(), v.into());
    }
}
