use thiserror::Error;

use crate::flows::wizard::WizardTransitionError;
use crate::gateway::GatewayError;
use crate::session::monitor::SessionError;
use crate::session::token::TokenError;
use crate::storage::StorageError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    WizardTransition(#[from] WizardTransitionError),
    #[error("line index {index} is out of range for {len} lines")]
    LineIndexOutOfRange { index: usize, len: usize },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("session failure: {0}")]
    Session(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StorageError> for ApplicationError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<SessionError> for ApplicationError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::InvalidToken(error) => Self::Token(error),
            SessionError::Storage(error) => Self::from(error),
            other => Self::Session(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("session expired: {message}")]
    SessionExpired { message: String, correlation_id: String },
    #[error("permission denied: {message}")]
    PermissionDenied { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::SessionExpired { .. } => "Your session has expired. Please sign in again.",
            Self::PermissionDenied { .. } => "You do not have permission to perform this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::SessionExpired { .. } => "session_expired",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::SessionExpired { correlation_id, .. }
            | Self::PermissionDenied { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::SessionExpired { correlation_id: id, .. }
            | InterfaceError::PermissionDenied { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Token(error) => {
                Self::SessionExpired { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Gateway(error) => match error {
                GatewayError::Unauthorized | GatewayError::MissingToken => Self::SessionExpired {
                    message: error.to_string(),
                    correlation_id: unassigned(),
                },
                GatewayError::Forbidden => Self::PermissionDenied {
                    message: error.to_string(),
                    correlation_id: unassigned(),
                },
                GatewayError::Status { status, .. } if (400..500).contains(&status) => {
                    Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
                }
                GatewayError::Server { .. }
                | GatewayError::Status { .. }
                | GatewayError::Timeout { .. }
                | GatewayError::Transport(_)
                | GatewayError::Decode(_) => Self::ServiceUnavailable {
                    message: error.to_string(),
                    correlation_id: unassigned(),
                },
            },
            ApplicationError::Session(message) => {
                Self::BadRequest { message, correlation_id: unassigned() }
            }
            ApplicationError::Storage(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
