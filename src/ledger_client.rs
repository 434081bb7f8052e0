use crate::{
    agent::{
        ContractCall,
        EmittedEvent,
        EventValue,
        LedgerMethod,
        PendingTransaction,
        Receipt,
        SigningAgent,
    },
    amount::Amount,
    error::{
        Result,
        WagerError,
    },
    session::SigningSession,
};
use fuels::types::{
    Address,
    ContractId,
    Identity,
};
use serde::Deserialize;
use std::{
    fmt,
    sync::Arc,
    time::Duration,
};
use tracing::{
    debug,
    info,
};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Call shape of the deployed ledger program.
///
/// Chosen once from configuration; a wager never mixes the two.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    /// `deposit{value}` must confirm before a zero-value `flipCoin(choice)`.
    TwoStep,
    /// A single payable `flipCoin{value}(choice)` stakes and resolves, together
    /// with anything earlier deposits left staked.
    #[default]
    OneStep,
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::TwoStep => write!(f, "two-step"),
            ProtocolVariant::OneStep => write!(f, "one-step"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Side {
    #[default]
    Heads,
    Tails,
}

impl Side {
    /// The bit the ledger program records; heads is `true`.
    pub fn as_bit(self) -> bool {
        matches!(self, Side::Heads)
    }

    pub fn from_bit(bit: bool) -> Self {
        if bit { Side::Heads } else { Side::Tails }
    }

    pub fn flipped(self) -> Self {
        match self {
            Side::Heads => Side::Tails,
            Side::Tails => Side::Heads,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Heads => write!(f, "heads"),
            Side::Tails => write!(f, "tails"),
        }
    }
}

/// The `(player, result)` pair every outcome event carries, whatever the
/// program calls the event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeEvent {
    pub player: Identity,
    pub result: Side,
}

impl OutcomeEvent {
    /// Recognises an outcome event by shape: exactly one identity argument and
    /// exactly one boolean argument.
    pub fn from_event(event: &EmittedEvent) -> Option<Self> {
        let mut identities = event.fields.values().filter_map(|value| match value {
            EventValue::Identity(identity) => Some(identity),
            _ => None,
        });
        let mut bits = event.fields.values().filter_map(|value| match value {
            EventValue::Bool(bit) => Some(*bit),
            _ => None,
        });
        let player = identities.next()?;
        let result = bits.next()?;
        if identities.next().is_some() || bits.next().is_some() {
            return None;
        }
        Some(Self {
            player: player.clone(),
            result: Side::from_bit(result),
        })
    }

    pub fn is_for(&self, address: &Address) -> bool {
        matches!(&self.player, Identity::Address(player) if player == address)
    }
}

/// Outcome events in `receipt` that belong to `player`.
pub fn outcome_events(receipt: &Receipt, player: &Address) -> Vec<OutcomeEvent> {
    receipt
        .events
        .iter()
        .filter_map(OutcomeEvent::from_event)
        .filter(|outcome| outcome.is_for(player))
        .collect()
}

/// Typed proxy over the ledger program's `deposit` and `flipCoin` entry points.
///
/// Calls are signed through the session for the duration of each call only.
pub struct LedgerClient<A> {
    session: Arc<SigningSession<A>>,
    contract: ContractId,
    variant: ProtocolVariant,
    confirmation_timeout: Duration,
}

impl<A: SigningAgent> LedgerClient<A> {
    pub fn new(
        session: Arc<SigningSession<A>>,
        contract: ContractId,
        variant: ProtocolVariant,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            session,
            contract,
            variant,
            confirmation_timeout,
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub async fn deposit(&self, value: Amount) -> Result<PendingTransaction> {
        self.send(LedgerMethod::Deposit, value).await
    }

    /// Submits `flipCoin(choice)`.
    ///
    /// `stake` is attached only for [`ProtocolVariant::OneStep`], where the
    /// program adds it to whatever earlier deposits left staked. The two-step
    /// program resolves against the staked balance alone and rejects attached
    /// value.
    pub async fn flip_coin(&self, choice: Side, stake: Amount) -> Result<PendingTransaction> {
        let value = match self.variant {
            ProtocolVariant::OneStep => stake,
            ProtocolVariant::TwoStep => Amount::ZERO,
        };
        self.send(
            LedgerMethod::FlipCoin {
                choice: choice.as_bit(),
            },
            value,
        )
        .await
    }

    /// Suspends until `pending` is included, bounded by the configured timeout.
    pub async fn await_confirmation(&self, pending: &PendingTransaction) -> Result<Receipt> {
        let receipt =
            tokio::time::timeout(self.confirmation_timeout, self.session.confirmation(pending))
                .await
                .map_err(|_| {
                    WagerError::Transport(format!(
                        "confirmation of {} timed out after {}s",
                        pending.tx_id,
                        self.confirmation_timeout.as_secs()
                    ))
                })??;
        debug!(
            tx_id = %receipt.tx_id,
            block_height = receipt.block_height,
            events = receipt.events.len(),
            "transaction confirmed"
        );
        Ok(receipt)
    }

    async fn send(&self, method: LedgerMethod, value: Amount) -> Result<PendingTransaction> {
        let call = ContractCall {
            contract: self.contract,
            method,
            value,
        };
        let pending = self.session.submit(call).await?;
        info!(
            method = method.name(),
            value = %value,
            tx_id = %pending.tx_id,
            "transaction submitted"
        );
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        agent::TxId,
        error::AgentFault,
        test_helpers::{
            ScriptedAgent,
            address,
            outcome_event,
        },
    };

    fn receipt_with(events: Vec<EmittedEvent>) -> Receipt {
        Receipt {
            tx_id: TxId([9; 32]),
            block_height: 1,
            events,
        }
    }

    async fn connected_client(
        variant: ProtocolVariant,
    ) -> (Arc<ScriptedAgent>, LedgerClient<ScriptedAgent>) {
        let agent = Arc::new(ScriptedAgent::with_account(address(1)));
        let session = Arc::new(SigningSession::new(agent.clone()));
        session.connect().await.unwrap();
        let client = LedgerClient::new(
            session,
            ContractId::new([5; 32]),
            variant,
            Duration::from_secs(30),
        );
        (agent, client)
    }

    #[test]
    fn from_event__matches_on_shape_not_name() {
        // given
        let player = Identity::Address(address(1));
        let named_result = EmittedEvent::new("CoinFlipResult")
            .with_field("player", EventValue::Identity(player.clone()))
            .with_field("result", EventValue::Bool(true));
        let named_flipped = EmittedEvent::new("CoinFlipped")
            .with_field("who", EventValue::Identity(player.clone()))
            .with_field("heads", EventValue::Bool(false))
            .with_field("amount", EventValue::U64(10));

        // when
        let first = OutcomeEvent::from_event(&named_result);
        let second = OutcomeEvent::from_event(&named_flipped);

        // then
        assert_eq!(
            first,
            Some(OutcomeEvent {
                player: player.clone(),
                result: Side::Heads
            })
        );
        assert_eq!(
            second,
            Some(OutcomeEvent {
                player,
                result: Side::Tails
            })
        );
    }

    #[test]
    fn from_event__ignores_events_without_a_single_bit_and_player() {
        let deposit = EmittedEvent::new("Deposited")
            .with_field("player", EventValue::Identity(Identity::Address(address(1))))
            .with_field("amount", EventValue::U64(10));
        let two_bits = EmittedEvent::new("Odd")
            .with_field("player", EventValue::Identity(Identity::Address(address(1))))
            .with_field("a", EventValue::Bool(true))
            .with_field("b", EventValue::Bool(false));

        assert_eq!(OutcomeEvent::from_event(&deposit), None);
        assert_eq!(OutcomeEvent::from_event(&two_bits), None);
    }

    #[test]
    fn outcome_events__filters_other_players() {
        // given
        let receipt = receipt_with(vec![
            outcome_event("CoinFlipResult", address(2), Side::Heads),
            outcome_event("CoinFlipResult", address(1), Side::Tails),
        ]);

        // when
        let mine = outcome_events(&receipt, &address(1));

        // then
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].result, Side::Tails);
    }

    #[tokio::test]
    async fn flip_coin__attaches_stake_only_for_one_step() {
        // given
        let (one_agent, one_step) = connected_client(ProtocolVariant::OneStep).await;
        let (two_agent, two_step) = connected_client(ProtocolVariant::TwoStep).await;

        // when
        one_step.flip_coin(Side::Heads, Amount(40)).await.unwrap();
        two_step.flip_coin(Side::Tails, Amount(40)).await.unwrap();

        // then
        let one_call = one_agent.sent_calls().pop().unwrap();
        let two_call = two_agent.sent_calls().pop().unwrap();
        assert_eq!(one_call.method, LedgerMethod::FlipCoin { choice: true });
        assert_eq!(one_call.value, Amount(40));
        assert_eq!(two_call.method, LedgerMethod::FlipCoin { choice: false });
        assert_eq!(two_call.value, Amount::ZERO);
    }

    #[tokio::test]
    async fn deposit__fails_when_session_not_connected() {
        // given
        let agent = Arc::new(ScriptedAgent::with_account(address(1)));
        let session = Arc::new(SigningSession::new(agent.clone()));
        let client = LedgerClient::new(
            session,
            ContractId::new([5; 32]),
            ProtocolVariant::TwoStep,
            Duration::from_secs(30),
        );

        // when
        let result = client.deposit(Amount(10)).await;

        // then
        assert_eq!(result, Err(WagerError::NotConnected));
        assert!(agent.sent_calls().is_empty());
    }

    #[tokio::test]
    async fn await_confirmation__surfaces_reverts() {
        // given
        let (agent, client) = connected_client(ProtocolVariant::OneStep).await;
        agent.fail_next_confirmation(AgentFault::Reverted("house cannot cover".into()));
        let pending = client.flip_coin(Side::Heads, Amount(10)).await.unwrap();

        // when
        let result = client.await_confirmation(&pending).await;

        // then
        assert_eq!(result, Err(WagerError::Reverted("house cannot cover".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn await_confirmation__times_out_as_transport_error() {
        // given
        let (agent, client) = connected_client(ProtocolVariant::OneStep).await;
        let _gate = agent.hold_confirmations();
        let pending = client.flip_coin(Side::Heads, Amount(10)).await.unwrap();

        // when
        let result = client.await_confirmation(&pending).await;

        // then
        match result {
            Err(WagerError::Transport(message)) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
