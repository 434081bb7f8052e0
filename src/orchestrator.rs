//! Drives one deposit or wager attempt from user intent to a recorded outcome.

use crate::{
    agent::{
        Receipt,
        SigningAgent,
        TxId,
    },
    amount::{
        Amount,
        Denomination,
    },
    balance::{
        BalanceReader,
        BalanceSnapshot,
    },
    error::{
        Result,
        WagerError,
    },
    history::{
        RecordKind,
        RecordOutcome,
        SuccessDetail,
        TransactionLedger,
        TransactionRecord,
    },
    ledger_client::{
        LedgerClient,
        ProtocolVariant,
        Side,
        outcome_events,
    },
    session::SigningSession,
};
use chrono::Utc;
use fuels::types::Address;
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};
use tokio::sync::watch;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WagerState {
    Idle,
    Validating,
    SubmittingStake,
    AwaitingStakeConfirmation,
    SubmittingFlip,
    AwaitingFlipConfirmation,
    Resolving,
    Resolved,
    Failed,
}

impl WagerState {
    pub fn is_idle(self) -> bool {
        self == WagerState::Idle
    }

    pub fn label(self) -> &'static str {
        match self {
            WagerState::Idle => "Idle",
            WagerState::Validating => "Validating",
            WagerState::SubmittingStake => "Waiting for the wallet to sign the stake",
            WagerState::AwaitingStakeConfirmation => "Waiting for the stake to confirm",
            WagerState::SubmittingFlip => "Waiting for the wallet to sign the flip",
            WagerState::AwaitingFlipConfirmation => "Waiting for the flip to confirm",
            WagerState::Resolving => "Reading the outcome",
            WagerState::Resolved => "Resolved",
            WagerState::Failed => "Failed",
        }
    }
}

/// The attempt currently being driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Wager {
    pub amount: Amount,
    pub choice: Side,
    pub status: WagerState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WagerOutcome {
    Win { payout: Amount },
    Loss { deducted: Amount },
}

impl From<WagerOutcome> for SuccessDetail {
    fn from(outcome: WagerOutcome) -> Self {
        match outcome {
            WagerOutcome::Win { payout } => SuccessDetail::Won { payout },
            WagerOutcome::Loss { deducted } => SuccessDetail::Lost { deducted },
        }
    }
}

/// Holds the single-flight slot; gives it back on every exit path.
struct InFlight<'a> {
    state: &'a watch::Sender<WagerState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.send_replace(WagerState::Idle);
    }
}

/// State machine for deposits and coin-flip wagers.
///
/// At most one attempt runs per orchestrator: `submit` or `deposit` while
/// another attempt is between `Validating` and its terminal state fails with
/// [`WagerError::WagerInProgress`] and records nothing. Once a value-bearing
/// call reached the signing agent the attempt runs to a terminal state, then
/// appends exactly one record and refreshes the balance once before the
/// machine is `Idle` again.
///
/// A flip consumes everything staked for the player, including deposits made
/// on their own and stakes whose flip never went through. The orchestrator
/// tracks that uncommitted stake so the recorded amount and payout match what
/// the ledger settled.
pub struct WagerOrchestrator<A> {
    session: Arc<SigningSession<A>>,
    ledger: LedgerClient<A>,
    balance: BalanceReader<A>,
    denomination: Denomination,
    history: Mutex<TransactionLedger>,
    uncommitted: Mutex<Amount>,
    state: watch::Sender<WagerState>,
}

impl<A: SigningAgent> WagerOrchestrator<A> {
    pub fn new(
        session: Arc<SigningSession<A>>,
        ledger: LedgerClient<A>,
        denomination: Denomination,
    ) -> Self {
        let balance = BalanceReader::new(session.agent().clone());
        let (state, _) = watch::channel(WagerState::Idle);
        Self {
            session,
            ledger,
            balance,
            denomination,
            history: Mutex::new(TransactionLedger::new()),
            uncommitted: Mutex::new(Amount::ZERO),
            state,
        }
    }

    pub fn session(&self) -> &Arc<SigningSession<A>> {
        &self.session
    }

    pub fn denomination(&self) -> &Denomination {
        &self.denomination
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.ledger.variant()
    }

    pub fn state(&self) -> WagerState {
        *self.state.borrow()
    }

    /// Observes state transitions, e.g. to drive a progress indicator.
    pub fn subscribe(&self) -> watch::Receiver<WagerState> {
        self.state.subscribe()
    }

    /// Copy of the history, oldest first.
    pub fn history(&self) -> Vec<TransactionRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .all()
            .to_vec()
    }

    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn balance(&self) -> Option<BalanceSnapshot> {
        self.balance.current()
    }

    /// Stake confirmed on the ledger that no flip has consumed yet.
    pub fn uncommitted_stake(&self) -> Amount {
        *self.uncommitted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connects the wallet and takes the first balance snapshot.
    pub async fn connect(&self) -> Result<Address> {
        let address = self.session.connect().await?;
        if let Err(err) = self.balance.refresh(&address).await {
            warn!(%err, "initial balance read failed");
        }
        Ok(address)
    }

    pub async fn refresh_balance(&self) -> Result<BalanceSnapshot> {
        let owner = self.session.address()?;
        self.balance.refresh(&owner).await
    }

    /// Stakes `amount` on `choice` and resolves the flip.
    pub async fn submit(&self, amount: &str, choice: Side) -> Result<WagerOutcome> {
        let _slot = self.claim_slot()?;
        let stake = self.validate(amount)?;
        let mut wager = Wager {
            amount: stake,
            choice,
            status: WagerState::Validating,
        };
        info!(amount = %self.denomination.format(stake), %choice, variant = %self.variant(), "wager started");

        let mut submitted = Vec::new();
        let result = self.run_wager(&mut wager, &mut submitted).await;
        self.finish(RecordKind::Flip, wager.amount, Some(choice), submitted, result)
            .await
    }

    /// Stakes `amount` without flipping.
    pub async fn deposit(&self, amount: &str) -> Result<Amount> {
        let _slot = self.claim_slot()?;
        let value = self.validate(amount)?;
        info!(amount = %self.denomination.format(value), "deposit started");

        let mut submitted = Vec::new();
        let result = self.run_deposit(value, &mut submitted).await;
        self.finish(RecordKind::Deposit, value, None, submitted, result)
            .await
            .map(|_| value)
    }

    fn claim_slot(&self) -> Result<InFlight<'_>> {
        let claimed = self.state.send_if_modified(|state| {
            if state.is_idle() {
                *state = WagerState::Validating;
                true
            } else {
                false
            }
        });
        if claimed {
            Ok(InFlight { state: &self.state })
        } else {
            warn!(state = ?self.state(), "rejected attempt while another is in flight");
            Err(WagerError::WagerInProgress)
        }
    }

    fn validate(&self, amount: &str) -> Result<Amount> {
        let value = self.denomination.parse(amount)?;
        self.session.address()?;
        Ok(value)
    }

    fn set_state(&self, next: WagerState) {
        let previous = self.state.send_replace(next);
        info!(from = ?previous, to = ?next, "wager state");
    }

    fn advance(&self, wager: &mut Wager, next: WagerState) {
        wager.status = next;
        self.set_state(next);
    }

    async fn run_wager(
        &self,
        wager: &mut Wager,
        submitted: &mut Vec<TxId>,
    ) -> Result<WagerOutcome> {
        if self.ledger.variant() == ProtocolVariant::TwoStep {
            self.advance(wager, WagerState::SubmittingStake);
            let stake = self.ledger.deposit(wager.amount).await?;
            submitted.push(stake.tx_id);
            self.advance(wager, WagerState::AwaitingStakeConfirmation);
            self.ledger.await_confirmation(&stake).await?;
            self.add_uncommitted(wager.amount)?;
        }

        self.advance(wager, WagerState::SubmittingFlip);
        let flip = self.ledger.flip_coin(wager.choice, wager.amount).await?;
        submitted.push(flip.tx_id);
        self.advance(wager, WagerState::AwaitingFlipConfirmation);
        let receipt = self.ledger.await_confirmation(&flip).await?;

        // The confirmed flip settled the whole stake.
        let carried = self.take_uncommitted();
        let typed = wager.amount;
        wager.amount = match self.ledger.variant() {
            ProtocolVariant::TwoStep => carried,
            ProtocolVariant::OneStep => carried.checked_add(wager.amount).ok_or_else(|| {
                WagerError::InvalidAmount("stake exceeds the representable range".into())
            })?,
        };
        if wager.amount != typed {
            info!(
                typed = %self.denomination.format(typed),
                stake = %self.denomination.format(wager.amount),
                "flip settled stake carried from earlier attempts"
            );
        }

        self.advance(wager, WagerState::Resolving);
        self.resolve(&receipt, wager)
    }

    async fn run_deposit(&self, value: Amount, submitted: &mut Vec<TxId>) -> Result<SuccessDetail> {
        self.set_state(WagerState::SubmittingStake);
        let pending = self.ledger.deposit(value).await?;
        submitted.push(pending.tx_id);
        self.set_state(WagerState::AwaitingStakeConfirmation);
        self.ledger.await_confirmation(&pending).await?;
        self.add_uncommitted(value)?;
        Ok(SuccessDetail::Deposited)
    }

    fn add_uncommitted(&self, value: Amount) -> Result<()> {
        let mut uncommitted = self.uncommitted.lock().unwrap_or_else(PoisonError::into_inner);
        *uncommitted = uncommitted.checked_add(value).ok_or_else(|| {
            WagerError::InvalidAmount("stake exceeds the representable range".into())
        })?;
        Ok(())
    }

    fn take_uncommitted(&self) -> Amount {
        std::mem::take(&mut *self.uncommitted.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reads win or loss off the flip receipt.
    ///
    /// Only an outcome event for the connected player counts. Without one, or
    /// with events for both results, the attempt is ambiguous and is never
    /// guessed.
    fn resolve(&self, receipt: &Receipt, wager: &Wager) -> Result<WagerOutcome> {
        let player = self.session.address()?;
        let outcomes = outcome_events(receipt, &player);
        let won = outcomes.iter().any(|outcome| outcome.result == wager.choice);
        let lost = outcomes.iter().any(|outcome| outcome.result != wager.choice);
        match (won, lost) {
            (true, false) => {
                let payout = wager.amount.payout().ok_or_else(|| {
                    WagerError::InvalidAmount("payout exceeds the representable range".into())
                })?;
                Ok(WagerOutcome::Win { payout })
            }
            (false, true) => Ok(WagerOutcome::Loss {
                deducted: wager.amount,
            }),
            (false, false) => {
                warn!(
                    tx_id = %receipt.tx_id,
                    events = receipt.events.len(),
                    "flip receipt has no outcome event for this player"
                );
                Err(WagerError::AmbiguousOutcome)
            }
            (true, true) => {
                warn!(tx_id = %receipt.tx_id, "flip receipt reports both results");
                Err(WagerError::AmbiguousOutcome)
            }
        }
    }

    async fn finish<T>(
        &self,
        kind: RecordKind,
        amount: Amount,
        choice: Option<Side>,
        transactions: Vec<TxId>,
        result: Result<T>,
    ) -> Result<T>
    where
        T: Clone + Into<SuccessDetail>,
    {
        let outcome = match &result {
            Ok(value) => {
                self.set_state(WagerState::Resolved);
                RecordOutcome::Success(value.clone().into())
            }
            Err(err) => {
                self.set_state(WagerState::Failed);
                warn!(%err, ?kind, "attempt failed");
                RecordOutcome::Failure(err.clone())
            }
        };
        info!(?kind, ?outcome, "attempt finished");
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(TransactionRecord {
                kind,
                amount,
                choice,
                outcome,
                transactions,
                submitted_at: Utc::now(),
            });

        if let Err(err) = self.refresh_balance().await {
            warn!(%err, "balance refresh after attempt failed");
        }
        result
    }
}
