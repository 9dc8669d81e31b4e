//! Provider configuration

use std::collections::HashMap;

use cirrus_core::error::ErrorKind;
use cirrus_core::resource::{AttributesExt, Value};

use crate::utils::normalize_region;

/// Settings of the AWS provider, read from the `provider` block
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Region (e.g., "ap-northeast-1")
    pub region: String,
    /// Named profile from the shared config files
    pub profile: Option<String>,
    /// Make one last create attempt after the retry budget runs out
    pub retry_final_attempt: bool,
}

impl ProviderConfig {
    pub fn new(region: &str) -> Self {
        Self {
            region: normalize_region(region),
            profile: None,
            retry_final_attempt: true,
        }
    }

    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ErrorKind> {
        let region = attributes
            .get_string("region")
            .ok_or_else(|| ErrorKind::config("provider 'region' is required"))?;

        Ok(Self {
            region: normalize_region(region),
            profile: attributes.get_string("profile").map(str::to_string),
            retry_final_attempt: attributes.get_bool_or("retry_final_attempt", true),
        })
    }
}
