pub mod tplink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CloudCredentials;
use crate::monitor::schedule::PollTier;

pub use tplink::{CloudDevice, TpLinkCloud};

/// TP-Link cloud error codes that change how the monitor reacts.
pub const ERROR_CODE_TOKEN_EXPIRED: i64 = -20651;
pub const ERROR_CODE_DEVICE_OFFLINE: i64 = -20571;

/// Instantaneous watts and cumulative kWh reported by the plug's emeter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmeterStatus {
    pub power: f64,
    pub total: f64,
}

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("token expired")]
    TokenExpired,
    #[error("device is offline")]
    DeviceOffline,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("no token provided")]
    MissingToken,
    #[error("TP-Link API error ({code}): {msg}")]
    Api { code: i64, msg: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// What the monitor should do after a failed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Try one inline credential refresh
    RefreshToken,
    /// Keep polling at a reduced cadence
    Backoff(PollTier),
}

impl CloudError {
    /// Map a non-zero `error_code` from the cloud API to a typed error.
    pub fn from_api(code: i64, msg: impl Into<String>) -> Self {
        match code {
            ERROR_CODE_TOKEN_EXPIRED => CloudError::TokenExpired,
            ERROR_CODE_DEVICE_OFFLINE => CloudError::DeviceOffline,
            _ => CloudError::Api {
                code,
                msg: msg.into(),
            },
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            CloudError::TokenExpired => Recovery::RefreshToken,
            CloudError::DeviceOffline => Recovery::Backoff(PollTier::Offline),
            _ => Recovery::Backoff(PollTier::Error),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            CloudError::Auth(_) | CloudError::TokenExpired | CloudError::MissingToken
        )
    }
}

/// The vendor cloud as seen by a monitor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Authenticate and return a fresh token.
    async fn login(&self, credentials: &CloudCredentials) -> Result<String, CloudError>;

    async fn get_emeter_status(
        &self,
        credentials: &CloudCredentials,
    ) -> Result<EmeterStatus, CloudError>;

    /// Energy-metering plugs bound to the account.
    async fn get_device_list(
        &self,
        credentials: &CloudCredentials,
    ) -> Result<Vec<CloudDevice>, CloudError>;
}
