//! The narrow capability the client consumes from an external signing agent
//! (a wallet extension holding the keys) and the shapes of the calls, receipts
//! and events that cross that boundary.

use crate::{
    amount::Amount,
    error::AgentFault,
};
use fuels::types::{
    Address,
    ContractId,
    Identity,
};
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
};

pub type AgentResult<T> = std::result::Result<T, AgentFault>;

/// Entry points of the ledger program that the client calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerMethod {
    Deposit,
    FlipCoin { choice: bool },
}

impl LedgerMethod {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerMethod::Deposit => "deposit",
            LedgerMethod::FlipCoin { .. } => "flipCoin",
        }
    }
}

/// A contract call handed to the agent for signing and submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCall {
    pub contract: ContractId,
    pub method: LedgerMethod,
    /// Native value attached to the call.
    pub value: Amount,
}

/// Hash of a submitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Handle for a transaction the agent accepted but which is not yet included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    pub tx_id: TxId,
    pub call: ContractCall,
}

/// A decoded event argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventValue {
    Identity(Identity),
    Bool(bool),
    U64(u64),
    Text(String),
}

/// An event emitted by the ledger program during a transaction.
///
/// Programs in the same family name their events differently, so consumers
/// match on [`EmittedEvent::fields`] rather than on [`EmittedEvent::name`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedEvent {
    pub name: String,
    pub fields: BTreeMap<String, EventValue>,
}

impl EmittedEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: EventValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Proof of inclusion for a confirmed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_id: TxId,
    pub block_height: u32,
    pub events: Vec<EmittedEvent>,
}

/// Capability exposed by an external signing agent.
///
/// Implementations own the keys and the transport; the client never sees
/// either. A failed `await_confirmation` with [`AgentFault::Reverted`] means
/// the transaction was included but its effects were rolled back.
pub trait SigningAgent: Send + Sync {
    /// Prompts the user to expose accounts to the client.
    fn request_accounts(&self) -> impl Future<Output = AgentResult<Vec<Address>>> + Send;

    /// The account the agent will sign with.
    fn signer_address(&self) -> impl Future<Output = AgentResult<Address>> + Send;

    /// Spendable native balance of `address`.
    fn get_balance(
        &self,
        address: &Address,
    ) -> impl Future<Output = AgentResult<Amount>> + Send;

    /// Signs `call` and submits it; resolves once the agent accepted it.
    fn send_transaction(
        &self,
        call: ContractCall,
    ) -> impl Future<Output = AgentResult<PendingTransaction>> + Send;

    /// Suspends until `pending` is included.
    fn await_confirmation(
        &self,
        pending: &PendingTransaction,
    ) -> impl Future<Output = AgentResult<Receipt>> + Send;
}
