#![allow(non_snake_case)]
use coinflip_client::{
    amount::{
        Amount,
        Denomination,
    },
    error::WagerError,
    history::{
        RecordKind,
        RecordOutcome,
        SuccessDetail,
    },
    ledger_client::{
        LedgerClient,
        ProtocolVariant,
        Side,
    },
    orchestrator::{
        WagerOrchestrator,
        WagerOutcome,
    },
    session::SigningSession,
    simulated::{
        SimulatedLedger,
        SimulationConfig,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};

fn local(variant: ProtocolVariant) -> (Arc<SimulatedLedger>, WagerOrchestrator<SimulatedLedger>) {
    let config = SimulationConfig {
        variant,
        seed: Some(21),
        block_time: Duration::ZERO,
        ..SimulationConfig::default()
    };
    let ledger = Arc::new(SimulatedLedger::new(config.clone()));
    let session = Arc::new(SigningSession::new(ledger.clone()));
    let client = LedgerClient::new(
        session.clone(),
        config.contract,
        variant,
        Duration::from_secs(5),
    );
    (
        ledger,
        WagerOrchestrator::new(session, client, Denomination::default()),
    )
}

#[tokio::test]
async fn deposit__moves_value_into_the_stake() {
    // given
    let (ledger, orchestrator) = local(ProtocolVariant::TwoStep);
    orchestrator.connect().await.unwrap();
    let before = orchestrator.balance().unwrap().amount;

    // when
    let deposited = orchestrator.deposit("2.5").await;

    // then
    assert_eq!(deposited, Ok(Amount(2_500_000_000)));
    assert_eq!(ledger.staked(&ledger.player()), Amount(2_500_000_000));
    assert_eq!(
        orchestrator.balance().unwrap().amount,
        Amount(before.units() - 2_500_000_000)
    );
    let history = orchestrator.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, RecordKind::Deposit);
    assert_eq!(
        history[0].outcome,
        RecordOutcome::Success(SuccessDetail::Deposited)
    );
}

#[tokio::test]
async fn deposit__without_connection_is_rejected_before_submission() {
    // given
    let (ledger, orchestrator) = local(ProtocolVariant::TwoStep);

    // when
    let result = orchestrator.deposit("1").await;

    // then
    assert_eq!(result, Err(WagerError::NotConnected));
    assert_eq!(ledger.staked(&ledger.player()), Amount::ZERO);
    assert!(orchestrator.history().is_empty());
}

fn assert_settled_stake(
    orchestrator: &WagerOrchestrator<SimulatedLedger>,
    outcome: WagerOutcome,
    wallet_before_deposit: Amount,
    stake: Amount,
) {
    let record = orchestrator.history().last().cloned().unwrap();
    assert_eq!(record.amount, stake);
    let wallet = orchestrator.balance().unwrap().amount;
    match outcome {
        WagerOutcome::Win { payout } => {
            assert_eq!(payout, Amount(stake.units() * 2));
            assert_eq!(
                record.outcome,
                RecordOutcome::Success(SuccessDetail::Won { payout })
            );
            assert_eq!(wallet, Amount(wallet_before_deposit.units() + stake.units()));
        }
        WagerOutcome::Loss { deducted } => {
            assert_eq!(deducted, stake);
            assert_eq!(
                record.outcome,
                RecordOutcome::Success(SuccessDetail::Lost { deducted })
            );
            assert_eq!(wallet, Amount(wallet_before_deposit.units() - stake.units()));
        }
    }
}

#[tokio::test]
async fn deposit__then_two_step_flip_uses_the_combined_stake() {
    // given
    let (ledger, orchestrator) = local(ProtocolVariant::TwoStep);
    orchestrator.connect().await.unwrap();
    let wallet_before = orchestrator.balance().unwrap().amount;
    orchestrator.deposit("1").await.unwrap();

    // when
    let outcome = orchestrator.submit("1", Side::Heads).await.unwrap();

    // then
    assert_eq!(ledger.staked(&ledger.player()), Amount::ZERO);
    assert_eq!(orchestrator.history().len(), 2);
    assert_eq!(orchestrator.uncommitted_stake(), Amount::ZERO);
    assert_settled_stake(&orchestrator, outcome, wallet_before, Amount(2_000_000_000));
}

#[tokio::test]
async fn deposit__one_step_flip_spends_the_deposited_stake() {
    // given
    let (ledger, orchestrator) = local(ProtocolVariant::OneStep);
    orchestrator.connect().await.unwrap();
    let wallet_before = orchestrator.balance().unwrap().amount;
    orchestrator.deposit("1.5").await.unwrap();
    assert_eq!(ledger.staked(&ledger.player()), Amount(1_500_000_000));

    // when
    let outcome = orchestrator.submit("0.5", Side::Tails).await.unwrap();

    // then
    assert_eq!(ledger.staked(&ledger.player()), Amount::ZERO);
    assert_eq!(orchestrator.uncommitted_stake(), Amount::ZERO);
    assert_settled_stake(&orchestrator, outcome, wallet_before, Amount(2_000_000_000));
}
