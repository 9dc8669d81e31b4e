//! Error taxonomy shared by the retry, refresh and wait machinery

use std::time::Duration;

use thiserror::Error;

/// Error returned by a vendor API call: a symbolic code and a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this error carries the given code
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Classified failure of a reconciliation step
///
/// Absence of a remote object is never an error; it is reported through
/// `Observed::Absent` and `State::not_found` instead.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The remote system rejected the request (invalid input, permission denied)
    #[error("{0}")]
    Request(#[source] RemoteError),

    /// Propagation delay or eventual-consistency race that outlived its retry budget
    #[error("transient error: {0}")]
    Transient(#[source] RemoteError),

    /// The object exists but the response carried no status
    #[error("{what} status not provided")]
    StatusMissing { what: String },

    /// The wait budget ran out before a target status was observed
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
        .target.join(", "),
        .last_status.as_deref().unwrap_or("none"),
        .timeout
    )]
    WaitTimeout {
        last_status: Option<String>,
        target: Vec<String>,
        timeout: Duration,
    },

    /// The object entered a status outside the pending and target sets
    #[error("unexpected state '{status}'{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    UnexpectedStatus {
        status: String,
        reason: Option<String>,
    },

    /// The surrounding call was cancelled before the operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// The desired configuration cannot be turned into a request
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation is not available for this resource type
    #[error("{0}")]
    Unsupported(String),
}

impl ErrorKind {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
