use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::summary::QuotationSummary;
use crate::flows::payload::QuotationPayload;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("backend rejected the bearer token (401)")]
    Unauthorized,
    #[error("backend denied permission (403)")]
    Forbidden,
    #[error("backend server error ({status})")]
    Server { status: u16 },
    #[error("backend returned status {status}")]
    Status { status: u16, message: Option<String> },
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("response could not be decoded: {0}")]
    Decode(String),
    #[error("response did not carry a token")]
    MissingToken,
}

impl GatewayError {
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            500..=599 => Self::Server { status },
            _ => Self::Status { status, message },
        }
    }

    /// A 401 means the stored session is no longer usable and must be cleared.
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized | Self::MissingToken => {
                "Your session has expired. Please sign in again.".to_string()
            }
            Self::Forbidden => "You do not have permission to perform this action.".to_string(),
            Self::Server { .. } => {
                "The server encountered an error. Please try again later.".to_string()
            }
            Self::Status { status, .. } => format!("The request failed with status {status}."),
            Self::Timeout { .. } => {
                "The server took too long to respond. Retry when ready.".to_string()
            }
            Self::Transport(_) => "The server could not be reached. Retry when ready.".to_string(),
            Self::Decode(_) => "The server sent an unexpected response.".to_string(),
        }
    }
}

#[async_trait]
pub trait TokenRenewer: Send + Sync {
    /// Exchanges the current bearer token for a fresh one.
    async fn renew(&self, current_token: &str) -> Result<String, GatewayError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuotation {
    pub doc_entry: Option<i64>,
    pub doc_num: Option<i64>,
}

#[async_trait]
pub trait QuotationGateway: Send + Sync {
    async fn list(&self) -> Result<Vec<QuotationSummary>, GatewayError>;
    async fn fetch(&self, doc_entry: i64) -> Result<QuotationSummary, GatewayError>;
    async fn create(&self, payload: &QuotationPayload) -> Result<SavedQuotation, GatewayError>;
    async fn update(
        &self,
        doc_entry: i64,
        payload: &QuotationPayload,
    ) -> Result<SavedQuotation, GatewayError>;
}
