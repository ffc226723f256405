use crate::service_state::{CellIdentity, Domain, OperatorName, Rat, RegistrationInfo, Transport};
use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

pub mod cli;

/// Failure reported by the modem for a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The radio went away. Everything in flight is meaningless.
    #[error("radio not available")]
    RadioNotAvailable,
    #[error("operation not allowed before registration")]
    OpNotAllowedBeforeReg,
    #[error("request not supported")]
    RequestNotSupported,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

impl ChannelError {
    /// Errors that invalidate the whole poll round rather than a single slot.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChannelError::RadioNotAvailable)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioState {
    #[display("on")]
    On,
    #[display("off")]
    Off,
    #[display("unavailable")]
    Unavailable,
}

#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    #[default]
    #[display("automatic")]
    Automatic,
    #[display("manual")]
    Manual,
}

/// A cell seen by the modem. `registered` marks the serving cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    pub registered: bool,
    pub rat: Rat,
    pub identity: CellIdentity,
}

/// Asynchronous request/response interface to the modem.
///
/// Calls may complete in any order relative to each other, and callers must be
/// prepared for a call to never complete.
#[async_trait]
pub trait ModemChannel: 'static + Send + Sync {
    async fn operator_name(&self) -> Result<OperatorName, ChannelError>;

    async fn registration_info(
        &self,
        domain: Domain,
        transport: Transport,
    ) -> Result<RegistrationInfo, ChannelError>;

    async fn network_selection_mode(&self) -> Result<SelectionMode, ChannelError>;

    async fn set_radio_power(&self, on: bool) -> Result<(), ChannelError>;

    async fn request_shutdown(&self) -> Result<(), ChannelError>;

    async fn radio_state(&self) -> Result<RadioState, ChannelError>;

    async fn cell_info_list(&self) -> Result<Vec<CellInfo>, ChannelError>;
}

/// Data sessions of one subscription, owned by the data stack.
#[async_trait]
pub trait DataSessions: 'static + Send + Sync {
    /// True when no data session is up.
    async fn all_disconnected(&self) -> bool;

    /// Tears every session down and resolves once they are gone. May never resolve.
    async fn tear_down_all(&self);
}
