use crate::{
    agent::TxId,
    amount::Amount,
    error::WagerError,
    ledger_client::Side,
};
use chrono::{
    DateTime,
    Utc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Deposit,
    Flip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuccessDetail {
    Deposited,
    Won { payout: Amount },
    Lost { deducted: Amount },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Success(SuccessDetail),
    Failure(WagerError),
}

impl RecordOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Success(_))
    }
}

/// One finished deposit or wager attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub kind: RecordKind,
    pub amount: Amount,
    /// The side bet on; `None` for deposits.
    pub choice: Option<Side>,
    pub outcome: RecordOutcome,
    /// Transactions that reached the signing agent, in submission order.
    pub transactions: Vec<TxId>,
    pub submitted_at: DateTime<Utc>,
}

/// Session-scoped, append-only history of attempts, oldest first.
#[derive(Debug, Default)]
pub struct TransactionLedger {
    records: Vec<TransactionRecord>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }

    pub fn all(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TransactionRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn record(kind: RecordKind, units: u64) -> TransactionRecord {
        TransactionRecord {
            kind,
            amount: Amount(units),
            choice: None,
            outcome: RecordOutcome::Success(SuccessDetail::Deposited),
            transactions: Vec::new(),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn all__returns_records_in_append_order() {
        // given
        let mut ledger = TransactionLedger::new();

        // when
        ledger.append(record(RecordKind::Deposit, 1));
        ledger.append(record(RecordKind::Flip, 2));
        ledger.append(record(RecordKind::Deposit, 3));

        // then
        let amounts: Vec<u64> = ledger.all().iter().map(|r| r.amount.units()).collect();
        assert_eq!(amounts, vec![1, 2, 3]);
        assert_eq!(ledger.last().map(|r| r.kind), Some(RecordKind::Deposit));
    }

    #[test]
    fn is_empty__true_for_new_ledger() {
        let ledger = TransactionLedger::new();

        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
    }
}
