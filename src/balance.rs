use crate::{
    agent::SigningAgent,
    amount::Amount,
    error::{
        Result,
        WagerError,
    },
};
use chrono::{
    DateTime,
    Utc,
};
use fuels::types::Address;
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};
use tracing::{
    debug,
    warn,
};

/// One read of an account's spendable balance.
///
/// `as_of` orders snapshots taken during the session; a later refresh always
/// replaces the current snapshot wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub owner: Address,
    pub amount: Amount,
    pub as_of: u64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct ReaderState {
    current: Option<BalanceSnapshot>,
    reads: u64,
}

/// Reads balances through the signing agent's transport.
///
/// Only the latest successful snapshot is kept. A failed read leaves it in
/// place, so a display built from [`BalanceReader::current`] goes stale rather
/// than blank.
pub struct BalanceReader<A> {
    agent: Arc<A>,
    state: Mutex<ReaderState>,
}

impl<A: SigningAgent> BalanceReader<A> {
    pub fn new(agent: Arc<A>) -> Self {
        Self {
            agent,
            state: Mutex::new(ReaderState::default()),
        }
    }

    pub async fn refresh(&self, owner: &Address) -> Result<BalanceSnapshot> {
        let amount = match self.agent.get_balance(owner).await {
            Ok(amount) => amount,
            Err(fault) => {
                warn!(%owner, %fault, "balance read failed; keeping previous snapshot");
                return Err(WagerError::Transport(fault.to_string()));
            }
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reads += 1;
        let snapshot = BalanceSnapshot {
            owner: *owner,
            amount,
            as_of: state.reads,
            fetched_at: Utc::now(),
        };
        debug!(%owner, %amount, as_of = snapshot.as_of, "balance refreshed");
        state.current = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub fn current(&self) -> Option<BalanceSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }
}
