use coinflip_client::{
    config::{
        AppConfig,
        Command,
    },
    orchestrator::WagerOutcome,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use itertools::Itertools;

/// Runs a single subcommand against a fresh session and prints the result.
pub async fn run(config: &AppConfig, command: Command) -> Result<()> {
    let (_ledger, orchestrator) = config.local_orchestrator();
    let denomination = orchestrator.denomination().clone();
    let address = orchestrator
        .connect()
        .await
        .wrap_err("Failed to connect to the signing agent")?;
    println!("Wallet: {address}");

    match command {
        Command::Flip { amount, side } => {
            let outcome = orchestrator
                .submit(&amount, side)
                .await
                .wrap_err("Flip failed")?;
            match outcome {
                WagerOutcome::Win { payout } => println!(
                    "Landed {side}: won {}",
                    denomination.format_with_ticker(payout)
                ),
                WagerOutcome::Loss { deducted } => println!(
                    "Landed {}: lost {}",
                    side.flipped(),
                    denomination.format_with_ticker(deducted)
                ),
            }
        }
        Command::Deposit { amount } => {
            let deposited = orchestrator
                .deposit(&amount)
                .await
                .wrap_err("Deposit failed")?;
            println!("Deposited {}", denomination.format_with_ticker(deposited));
        }
        Command::Balance => {}
    }

    if let Some(record) = orchestrator.history().last() {
        println!("Transactions: {}", record.transactions.iter().join(", "));
    }

    let snapshot = orchestrator
        .balance()
        .ok_or_else(|| eyre!("Balance could not be read"))?;
    println!("Balance: {}", denomination.format_with_ticker(snapshot.amount));
    Ok(())
}
