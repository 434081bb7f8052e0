//! Client for staking on a coin flip settled by a ledger program behind an
//! external signing agent.
//!
//! [`orchestrator::WagerOrchestrator`] drives each attempt through the
//! [`session::SigningSession`] and [`ledger_client::LedgerClient`], reads the
//! outcome off the confirmation receipt and appends it to the
//! [`history::TransactionLedger`]. [`simulated::SimulatedLedger`] stands in for
//! the signing agent and the deployed program when running locally.

pub mod agent;
pub mod amount;
pub mod balance;
pub mod config;
pub mod error;
pub mod history;
pub mod ledger_client;
pub mod logging;
pub mod orchestrator;
pub mod session;
pub mod simulated;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
