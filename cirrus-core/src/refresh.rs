//! State Refresh Function - A single observation of a remote object
//!
//! A refresh reports the object and its current status, or that the object
//! is absent. Absence is a normal outcome, never an error.

use crate::error::{ErrorKind, RemoteError};
use crate::retry::ErrorTable;

/// Status reported for objects that no longer exist
pub const NOT_FOUND_STATUS: &str = "destroyed";

/// Result of one refresh
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<T> {
    Present {
        object: T,
        status: String,
        /// Vendor-supplied explanation of the status (state-change reason)
        reason: Option<String>,
    },
    Absent,
}

impl<T> Observed<T> {
    pub fn present(object: T, status: impl Into<String>) -> Self {
        Observed::Present {
            object,
            status: status.into(),
            reason: None,
        }
    }

    /// Build an observation from a response whose status may be missing.
    ///
    /// A present object without a status is an error, not absence.
    pub fn from_status(object: T, status: Option<String>, what: &str) -> Result<Self, ErrorKind> {
        match status {
            Some(status) => Ok(Self::present(object, status)),
            None => Err(ErrorKind::StatusMissing {
                what: what.to_string(),
            }),
        }
    }

    pub fn with_reason(self, reason: Option<String>) -> Self {
        match self {
            Observed::Present { object, status, .. } => Observed::Present {
                object,
                status,
                reason,
            },
            Observed::Absent => Observed::Absent,
        }
    }

    pub fn status(&self) -> &str {
        match self {
            Observed::Present { status, .. } => status,
            Observed::Absent => NOT_FOUND_STATUS,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Observed::Absent)
    }

    pub fn into_object(self) -> Option<T> {
        match self {
            Observed::Present { object, .. } => Some(object),
            Observed::Absent => None,
        }
    }
}

/// Interpret the result of a describe call.
///
/// Errors matching `not_found` become `Observed::Absent`; any other vendor
/// error is reported as transient so the caller may retry it.
pub fn observe<T>(
    result: Result<Observed<T>, RemoteError>,
    not_found: &ErrorTable,
) -> Result<Observed<T>, ErrorKind> {
    match result {
        Ok(observed) => Ok(observed),
        Err(e) if not_found.matches(&e) => Ok(Observed::Absent),
        Err(e) => Err(ErrorKind::Transient(e)),
    }
}
