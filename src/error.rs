//! Error taxonomy shared by the session, the ledger client and the orchestrator.

use thiserror::Error;

pub type Result<T, E = WagerError> = std::result::Result<T, E>;

/// Every way a connect, refresh, deposit or wager can fail.
///
/// None of these are retried by the crate. A failure after a call was handed to
/// the signing agent is also written to the transaction ledger, so the
/// variants carry owned text rather than source errors and stay `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WagerError {
    #[error("no signing agent is available")]
    AgentUnavailable,

    #[error("the signing agent declined the request")]
    UserRejected,

    #[error("signing agent error: {0}")]
    AgentError(String),

    #[error("no wallet is connected")]
    NotConnected,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds for this transaction")]
    InsufficientFunds,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("the confirmation receipt carried no outcome event for this wager")]
    AmbiguousOutcome,

    #[error("a wager is already in progress")]
    WagerInProgress,
}

/// Faults reported by a [`SigningAgent`](crate::agent::SigningAgent).
///
/// The same transport fault means different things depending on where it
/// happened, so the agent reports these and the caller maps them into
/// [`WagerError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentFault {
    #[error("signing agent not present")]
    Unavailable,

    #[error("request rejected by the user")]
    Rejected,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("reverted: {0}")]
    Reverted(String),

    #[error("{0}")]
    Transport(String),
}

impl AgentFault {
    /// Mapping used once a call is in the signing/confirmation path.
    pub fn into_call_error(self) -> WagerError {
        match self {
            AgentFault::Unavailable => WagerError::AgentUnavailable,
            AgentFault::Rejected => WagerError::UserRejected,
            AgentFault::InsufficientFunds => WagerError::InsufficientFunds,
            AgentFault::Reverted(reason) => WagerError::Reverted(reason),
            AgentFault::Transport(message) => WagerError::Transport(message),
        }
    }

    /// Mapping used while connecting; transport faults surface as agent errors.
    pub fn into_connect_error(self) -> WagerError {
        match self {
            AgentFault::Unavailable => WagerError::AgentUnavailable,
            AgentFault::Rejected => WagerError::UserRejected,
            other => WagerError::AgentError(other.to_string()),
        }
    }
}
