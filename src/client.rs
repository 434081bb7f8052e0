use crate::ui;
use coinflip_client::{
    amount::{
        Amount,
        Denomination,
    },
    balance::BalanceSnapshot,
    config::AppConfig,
    error::{
        Result as WagerResult,
        WagerError,
    },
    history::{
        RecordKind,
        RecordOutcome,
        SuccessDetail,
        TransactionRecord,
    },
    ledger_client::{
        ProtocolVariant,
        Side,
    },
    orchestrator::{
        WagerOrchestrator,
        WagerOutcome,
        WagerState,
    },
    simulated::SimulatedLedger,
};
use color_eyre::eyre::Result;
use crossterm::event::EventStream;
use fuels::types::Address;
use futures::StreamExt;
use std::{
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    error,
    info,
};

const MAX_ERRORS: usize = 50;
const FRAME_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    Success,
    Failure,
    Neutral,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryRow {
    pub text: String,
    pub tone: Tone,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub wallet: Option<Address>,
    pub agent_missing: bool,
    pub balance: Option<String>,
    pub variant: ProtocolVariant,
    pub side: Side,
    pub wager_state: WagerState,
    pub history: Vec<HistoryRow>,
    pub status: String,
    pub errors: Vec<String>,
}

/// Completion of a task spawned off the UI loop.
pub enum TaskDone {
    Connected(WagerResult<Address>),
    Flipped {
        side: Side,
        result: WagerResult<WagerOutcome>,
    },
    Deposited(WagerResult<Amount>),
    Refreshed(WagerResult<BalanceSnapshot>),
}

pub struct AppController {
    orchestrator: Arc<WagerOrchestrator<SimulatedLedger>>,
    done_tx: mpsc::UnboundedSender<TaskDone>,
    side: Side,
    status: String,
    pending: Option<String>,
    agent_missing: bool,
    errors: Vec<String>,
}

impl AppController {
    pub fn new(
        orchestrator: Arc<WagerOrchestrator<SimulatedLedger>>,
        done_tx: mpsc::UnboundedSender<TaskDone>,
    ) -> Self {
        Self {
            orchestrator,
            done_tx,
            side: Side::default(),
            status: String::from("Press c to connect your wallet"),
            pending: None,
            agent_missing: false,
            errors: Vec::new(),
        }
    }

    fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(Arc<WagerOrchestrator<SimulatedLedger>>) -> Fut,
        Fut: Future<Output = TaskDone> + Send + 'static,
    {
        let work = task(self.orchestrator.clone());
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            // receiver only goes away on shutdown
            let _ = done_tx.send(work.await);
        });
    }

    pub fn connect(&mut self) {
        self.status = String::from("Waiting for the wallet to approve the connection");
        self.spawn(|orchestrator| async move { TaskDone::Connected(orchestrator.connect().await) });
    }

    pub fn toggle_side(&mut self) {
        self.side = self.side.flipped();
    }

    pub fn flip(&mut self, amount: String) {
        let side = self.side;
        self.note_pending(format!("Flip {} on {}", amount, side));
        self.spawn(move |orchestrator| async move {
            let result = orchestrator.submit(&amount, side).await;
            TaskDone::Flipped { side, result }
        });
    }

    pub fn deposit(&mut self, amount: String) {
        self.note_pending(format!("Deposit {}", amount));
        self.spawn(move |orchestrator| async move {
            TaskDone::Deposited(orchestrator.deposit(&amount).await)
        });
    }

    pub fn refresh(&mut self) {
        self.spawn(|orchestrator| async move {
            TaskDone::Refreshed(orchestrator.refresh_balance().await)
        });
    }

    fn note_pending(&mut self, description: String) {
        if self.orchestrator.state().is_idle() {
            self.pending = Some(description);
        }
    }

    fn settle<T>(&mut self, result: &WagerResult<T>) {
        if !matches!(result, Err(WagerError::WagerInProgress)) {
            self.pending = None;
        }
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<WagerState> {
        self.orchestrator.subscribe()
    }

    pub fn apply(&mut self, done: TaskDone) {
        let denomination = self.orchestrator.denomination().clone();
        match done {
            TaskDone::Connected(Ok(address)) => {
                self.agent_missing = false;
                self.status = format!("Connected as {address}");
            }
            TaskDone::Connected(Err(WagerError::AgentUnavailable)) => {
                self.agent_missing = true;
                self.push_errors(vec![WagerError::AgentUnavailable.to_string()]);
            }
            TaskDone::Flipped { side, result } => {
                self.settle(&result);
                match result {
                    Ok(WagerOutcome::Win { payout }) => {
                        self.status = format!(
                            "{side}! You won {}",
                            denomination.format_with_ticker(payout)
                        );
                    }
                    Ok(WagerOutcome::Loss { deducted }) => {
                        self.status = format!(
                            "{}. You lost {}",
                            side.flipped(),
                            denomination.format_with_ticker(deducted)
                        );
                    }
                    Err(err) => self.push_errors(vec![err.to_string()]),
                }
            }
            TaskDone::Deposited(result) => {
                self.settle(&result);
                match result {
                    Ok(amount) => {
                        self.status =
                            format!("Deposited {}", denomination.format_with_ticker(amount));
                    }
                    Err(err) => self.push_errors(vec![err.to_string()]),
                }
            }
            TaskDone::Refreshed(Ok(_)) => {
                self.status = String::from("Balance refreshed");
            }
            TaskDone::Connected(Err(err)) | TaskDone::Refreshed(Err(err)) => {
                self.push_errors(vec![err.to_string()]);
            }
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let denomination = self.orchestrator.denomination();
        let wager_state = self.orchestrator.state();
        let mut history: Vec<HistoryRow> = self
            .orchestrator
            .history()
            .iter()
            .map(|record| describe_record(denomination, record))
            .collect();
        if let Some(pending) = self.pending.as_ref().filter(|_| !wager_state.is_idle()) {
            history.push(HistoryRow {
                text: format!("{pending}: {}", wager_state.label()),
                tone: Tone::Neutral,
            });
        }
        AppSnapshot {
            wallet: self.orchestrator.session().address().ok(),
            agent_missing: self.agent_missing,
            balance: self
                .orchestrator
                .balance()
                .map(|snapshot| denomination.format_with_ticker(snapshot.amount)),
            variant: self.orchestrator.variant(),
            side: self.side,
            wager_state,
            history,
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }
}

pub fn describe_record(denomination: &Denomination, record: &TransactionRecord) -> HistoryRow {
    let amount = denomination.format_with_ticker(record.amount);
    let head = match (record.kind, record.choice) {
        (RecordKind::Deposit, _) => format!("Deposit {amount}"),
        (RecordKind::Flip, Some(side)) => format!("Flip {amount} on {side}"),
        (RecordKind::Flip, None) => format!("Flip {amount}"),
    };
    let (detail, tone) = match &record.outcome {
        RecordOutcome::Success(SuccessDetail::Deposited) => {
            ("deposited".to_owned(), Tone::Success)
        }
        RecordOutcome::Success(SuccessDetail::Won { payout }) => (
            format!("won {}", denomination.format_with_ticker(*payout)),
            Tone::Neutral,
        ),
        RecordOutcome::Success(SuccessDetail::Lost { deducted }) => (
            format!("lost {}", denomination.format_with_ticker(*deducted)),
            Tone::Neutral,
        ),
        RecordOutcome::Failure(err) => (format!("failed: {err}"), Tone::Failure),
    };
    HistoryRow {
        text: format!(
            "{} {head}: {detail}",
            record.submitted_at.format("%H:%M:%S")
        ),
        tone,
    }
}

pub async fn run_app(config: &AppConfig) -> Result<()> {
    let (_ledger, orchestrator) = config.local_orchestrator();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut controller = AppController::new(orchestrator, done_tx);
    let mut ui_state = ui::UiState::default();
    info!(variant = %config.variant, "starting terminal UI");

    ui::terminal_enter(&mut ui_state)?;
    controller.connect();
    let res = run_loop(&mut controller, &mut ui_state, &mut done_rx).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    controller: &mut AppController,
    ui_state: &mut ui::UiState,
    done_rx: &mut mpsc::UnboundedReceiver<TaskDone>,
) -> Result<()> {
    let mut ticker = time::interval(FRAME_INTERVAL);
    let mut events = EventStream::new();
    let mut states = controller.subscribe();
    ui::draw(ui_state, &controller.snapshot())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { break; }
            _ = ticker.tick() => ui_state.advance_spinner(),
            Ok(()) = states.changed() => {}
            Some(done) = done_rx.recv() => controller.apply(done),
            event = events.next() => {
                let Some(event) = event else { break };
                match ui::handle_event(ui_state, event?) {
                    Some(ui::UserEvent::Quit) => break,
                    Some(ui::UserEvent::Connect) => controller.connect(),
                    Some(ui::UserEvent::ToggleSide) => controller.toggle_side(),
                    Some(ui::UserEvent::Flip(amount)) => controller.flip(amount),
                    Some(ui::UserEvent::Deposit(amount)) => controller.deposit(amount),
                    Some(ui::UserEvent::Refresh) => controller.refresh(),
                    Some(ui::UserEvent::Redraw) | None => {}
                }
            }
        }
        ui::draw(ui_state, &controller.snapshot())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use chrono::Utc;
    use coinflip_client::{
        agent::TxId,
        simulated::SimulationConfig,
    };

    fn record(kind: RecordKind, choice: Option<Side>, outcome: RecordOutcome) -> TransactionRecord {
        TransactionRecord {
            kind,
            amount: Amount(100_000_000),
            choice,
            outcome,
            transactions: vec![TxId([1; 32])],
            submitted_at: Utc::now(),
        }
    }

    fn controller() -> (AppController, mpsc::UnboundedReceiver<TaskDone>) {
        let config = AppConfig {
            variant: ProtocolVariant::OneStep,
            confirmation_timeout: Duration::from_secs(5),
            log_dir: std::env::temp_dir(),
            denomination: Denomination::default(),
            simulation: SimulationConfig {
                seed: Some(9),
                block_time: Duration::ZERO,
                ..SimulationConfig::default()
            },
            command: None,
        };
        let (_ledger, orchestrator) = config.local_orchestrator();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        (AppController::new(orchestrator, done_tx), done_rx)
    }

    #[test]
    fn describe_record__win_is_neutral_with_payout() {
        // given
        let win = record(
            RecordKind::Flip,
            Some(Side::Heads),
            RecordOutcome::Success(SuccessDetail::Won {
                payout: Amount(200_000_000),
            }),
        );

        // when
        let row = describe_record(&Denomination::default(), &win);

        // then
        assert_eq!(row.tone, Tone::Neutral);
        assert!(row.text.ends_with("Flip 0.1 ETH on heads: won 0.2 ETH"));
    }

    #[test]
    fn describe_record__loss_is_neutral_and_only_deposits_are_green() {
        // given
        let loss = record(
            RecordKind::Flip,
            Some(Side::Tails),
            RecordOutcome::Success(SuccessDetail::Lost {
                deducted: Amount(100_000_000),
            }),
        );
        let deposit = record(
            RecordKind::Deposit,
            None,
            RecordOutcome::Success(SuccessDetail::Deposited),
        );

        // when
        let loss_row = describe_record(&Denomination::default(), &loss);
        let deposit_row = describe_record(&Denomination::default(), &deposit);

        // then
        assert_eq!(loss_row.tone, Tone::Neutral);
        assert!(loss_row.text.ends_with("Flip 0.1 ETH on tails: lost 0.1 ETH"));
        assert_eq!(deposit_row.tone, Tone::Success);
    }

    #[test]
    fn describe_record__failure_is_red_with_reason() {
        // given
        let failed = record(
            RecordKind::Deposit,
            None,
            RecordOutcome::Failure(WagerError::UserRejected),
        );

        // when
        let row = describe_record(&Denomination::default(), &failed);

        // then
        assert_eq!(row.tone, Tone::Failure);
        assert!(row.text.contains("Deposit 0.1 ETH: failed: "));
    }

    #[tokio::test]
    async fn flip__reports_outcome_and_records_history() {
        // given
        let (mut controller, mut done_rx) = controller();
        controller.connect();
        let connected = done_rx.recv().await.unwrap();
        controller.apply(connected);

        // when
        controller.flip("0.5".into());
        let done = done_rx.recv().await.unwrap();
        controller.apply(done);

        // then
        let snapshot = controller.snapshot();
        assert!(snapshot.wallet.is_some());
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].tone, Tone::Neutral);
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.wager_state, WagerState::Idle);
    }

    #[tokio::test]
    async fn flip__invalid_amount_surfaces_an_error_without_history() {
        // given
        let (mut controller, mut done_rx) = controller();
        controller.connect();
        let connected = done_rx.recv().await.unwrap();
        controller.apply(connected);

        // when
        controller.flip("abc".into());
        let done = done_rx.recv().await.unwrap();
        controller.apply(done);

        // then
        let snapshot = controller.snapshot();
        assert!(snapshot.history.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
    }
}
