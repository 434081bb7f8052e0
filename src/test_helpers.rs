use crate::{
    agent::{
        AgentResult,
        ContractCall,
        EmittedEvent,
        EventValue,
        PendingTransaction,
        Receipt,
        SigningAgent,
        TxId,
    },
    amount::Amount,
    error::AgentFault,
    ledger_client::Side,
};
use fuels::types::{
    Address,
    Identity,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};
use tokio::sync::watch;

pub fn address(n: u8) -> Address {
    Address::new([n; 32])
}

/// An outcome event in the `(player, result)` shape the ledger program emits.
pub fn outcome_event(name: &str, player: Address, side: Side) -> EmittedEvent {
    EmittedEvent::new(name)
        .with_field("player", EventValue::Identity(Identity::Address(player)))
        .with_field("result", EventValue::Bool(side.as_bit()))
}

#[derive(Default)]
struct Script {
    accounts: Vec<Address>,
    signer: Address,
    balance: Amount,
    balance_reads: usize,
    accounts_fault: Option<AgentFault>,
    balance_fault: Option<AgentFault>,
    send_fault: Option<AgentFault>,
    confirmation_fault: Option<AgentFault>,
    receipts: VecDeque<Vec<EmittedEvent>>,
    sent: Vec<ContractCall>,
    nonce: u64,
    block_height: u32,
}

/// Signing agent whose answers are set up by the test.
///
/// Faults are one-shot: each `fail_next_*` affects only the next matching
/// request. Receipts pop queued events in order and are empty once the queue
/// runs out.
pub struct ScriptedAgent {
    script: Mutex<Script>,
    held: Arc<watch::Sender<bool>>,
}

impl ScriptedAgent {
    pub fn with_account(account: Address) -> Self {
        let (held, _) = watch::channel(false);
        Self {
            script: Mutex::new(Script {
                accounts: vec![account],
                signer: account,
                ..Script::default()
            }),
            held: Arc::new(held),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn switch_account(&self, account: Address) {
        let mut script = self.script();
        script.accounts = vec![account];
        script.signer = account;
    }

    pub fn set_balance(&self, balance: Amount) {
        self.script().balance = balance;
    }

    pub fn balance_reads(&self) -> usize {
        self.script().balance_reads
    }

    pub fn sent_calls(&self) -> Vec<ContractCall> {
        self.script().sent.clone()
    }

    pub fn push_receipt_events(&self, events: Vec<EmittedEvent>) {
        self.script().receipts.push_back(events);
    }

    pub fn fail_next_accounts_request(&self, fault: AgentFault) {
        self.script().accounts_fault = Some(fault);
    }

    pub fn fail_next_balance_read(&self, fault: AgentFault) {
        self.script().balance_fault = Some(fault);
    }

    pub fn fail_next_send(&self, fault: AgentFault) {
        self.script().send_fault = Some(fault);
    }

    pub fn fail_next_confirmation(&self, fault: AgentFault) {
        self.script().confirmation_fault = Some(fault);
    }

    /// Confirmations wait until the returned gate is released or dropped.
    pub fn hold_confirmations(&self) -> ConfirmationGate {
        self.held.send_replace(true);
        ConfirmationGate {
            held: self.held.clone(),
        }
    }
}

pub struct ConfirmationGate {
    held: Arc<watch::Sender<bool>>,
}

impl ConfirmationGate {
    pub fn release(&self) {
        self.held.send_replace(false);
    }
}

impl Drop for ConfirmationGate {
    fn drop(&mut self) {
        self.release();
    }
}

impl SigningAgent for ScriptedAgent {
    async fn request_accounts(&self) -> AgentResult<Vec<Address>> {
        let mut script = self.script();
        match script.accounts_fault.take() {
            Some(fault) => Err(fault),
            None => Ok(script.accounts.clone()),
        }
    }

    async fn signer_address(&self) -> AgentResult<Address> {
        Ok(self.script().signer)
    }

    async fn get_balance(&self, _address: &Address) -> AgentResult<Amount> {
        let mut script = self.script();
        script.balance_reads += 1;
        match script.balance_fault.take() {
            Some(fault) => Err(fault),
            None => Ok(script.balance),
        }
    }

    async fn send_transaction(&self, call: ContractCall) -> AgentResult<PendingTransaction> {
        let mut script = self.script();
        if let Some(fault) = script.send_fault.take() {
            return Err(fault);
        }
        script.nonce += 1;
        let mut id = [0u8; 32];
        id[..8].copy_from_slice(&script.nonce.to_be_bytes());
        script.sent.push(call.clone());
        Ok(PendingTransaction {
            tx_id: TxId(id),
            call,
        })
    }

    async fn await_confirmation(&self, pending: &PendingTransaction) -> AgentResult<Receipt> {
        let mut held = self.held.subscribe();
        held.wait_for(|held| !*held)
            .await
            .map_err(|_| AgentFault::Transport("confirmation gate closed".into()))?;

        let mut script = self.script();
        if let Some(fault) = script.confirmation_fault.take() {
            return Err(fault);
        }
        script.block_height += 1;
        Ok(Receipt {
            tx_id: pending.tx_id,
            block_height: script.block_height,
            events: script.receipts.pop_front().unwrap_or_default(),
        })
    }
}
