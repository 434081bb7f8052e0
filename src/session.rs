use crate::{
    agent::{
        ContractCall,
        PendingTransaction,
        Receipt,
        SigningAgent,
    },
    error::{
        Result,
        WagerError,
    },
};
use fuels::types::Address;
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected { address: Address },
}

/// The connection to the signing agent.
///
/// An address only ever enters the session through a successful
/// [`SigningSession::connect`], so `Connected` always holds an identity the
/// agent itself reported. There is no disconnect; the session lives as long as
/// the process does.
pub struct SigningSession<A> {
    agent: Arc<A>,
    state: Mutex<SessionState>,
}

impl<A: SigningAgent> SigningSession<A> {
    pub fn new(agent: Arc<A>) -> Self {
        Self {
            agent,
            state: Mutex::new(SessionState::Disconnected),
        }
    }

    pub fn agent(&self) -> &Arc<A> {
        &self.agent
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), SessionState::Connected { .. })
    }

    /// Requests account access and records the signer's address.
    ///
    /// On an already connected session the agent must report the same signer
    /// again; any failure leaves the existing connection untouched.
    pub async fn connect(&self) -> Result<Address> {
        let accounts = self
            .agent
            .request_accounts()
            .await
            .map_err(|fault| fault.into_connect_error())?;
        if accounts.is_empty() {
            return Err(WagerError::UserRejected);
        }
        let address = self
            .agent
            .signer_address()
            .await
            .map_err(|fault| fault.into_connect_error())?;
        if !accounts.contains(&address) {
            return Err(WagerError::AgentError(format!(
                "signer {address} is not among the exposed accounts"
            )));
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SessionState::Connected { address: current } if current != address => {
                warn!(%current, reported = %address, "signing agent switched accounts");
                Err(WagerError::AgentError(format!(
                    "agent now reports {address}, session is bound to {current}"
                )))
            }
            SessionState::Connected { .. } => Ok(address),
            SessionState::Disconnected => {
                *state = SessionState::Connected { address };
                info!(%address, "wallet connected");
                Ok(address)
            }
        }
    }

    pub fn address(&self) -> Result<Address> {
        match self.state() {
            SessionState::Connected { address } => Ok(address),
            SessionState::Disconnected => Err(WagerError::NotConnected),
        }
    }

    /// Signs and submits `call` as the connected account.
    pub(crate) async fn submit(&self, call: ContractCall) -> Result<PendingTransaction> {
        self.address()?;
        self.agent
            .send_transaction(call)
            .await
            .map_err(|fault| fault.into_call_error())
    }

    pub(crate) async fn confirmation(&self, pending: &PendingTransaction) -> Result<Receipt> {
        self.agent
            .await_confirmation(pending)
            .await
            .map_err(|fault| fault.into_call_error())
    }
}
