use crate::{
    amount::{
        Amount,
        DEFAULT_DECIMALS,
        DEFAULT_TICKER,
        Denomination,
    },
    ledger_client::{
        DEFAULT_CONFIRMATION_TIMEOUT,
        LedgerClient,
        ProtocolVariant,
        Side,
    },
    orchestrator::WagerOrchestrator,
    session::SigningSession,
    simulated::{
        DEFAULT_BLOCK_TIME,
        DEFAULT_PROFILE,
        SimulatedLedger,
        SimulationConfig,
        default_contract_id,
    },
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    ensure,
    eyre,
};
use fuels::types::ContractId;
use serde::Deserialize;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};

const DEFAULT_LOG_DIR: &str = "~/.coinflip/logs";
const DEFAULT_STARTING_BALANCE: &str = "10";

#[derive(Parser, Debug)]
#[command(
    name = "coinflip",
    about = "Stake on a coin flip settled by a ledger program (runs the terminal UI without a subcommand)",
    version
)]
pub struct Cli {
    /// JSON config file; flags given here override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Call shape of the deployed ledger program
    #[arg(long, global = true, value_enum)]
    pub variant: Option<ProtocolVariant>,

    /// Seconds to wait for a transaction to confirm
    #[arg(long, global = true)]
    pub confirmation_timeout: Option<u64>,

    /// Directory for the rolling log file (defaults to ~/.coinflip/logs)
    #[arg(long, global = true)]
    pub log_dir: Option<String>,

    /// Wallet profile name
    #[arg(long, global = true)]
    pub wallet: Option<String>,

    /// Ledger program id (32-byte hex)
    #[arg(long, global = true)]
    pub contract_id: Option<String>,

    /// Seed for the simulated coin
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Opening wallet balance of the simulation, as a decimal
    #[arg(long, global = true)]
    pub starting_balance: Option<String>,

    /// Simulated block time in milliseconds
    #[arg(long, global = true)]
    pub block_time_ms: Option<u64>,

    /// Behave as if no signing agent were installed
    #[arg(long, global = true)]
    pub no_agent: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stake an amount on a side and print the outcome
    Flip {
        #[arg(long)]
        amount: String,
        #[arg(long, value_enum, default_value_t = Side::Heads)]
        side: Side,
    },
    /// Stake an amount without flipping
    Deposit {
        #[arg(long)]
        amount: String,
    },
    /// Print the connected wallet's balance
    Balance,
}

/// Values accepted from a JSON config file. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub variant: Option<ProtocolVariant>,
    pub confirmation_timeout_secs: Option<u64>,
    pub log_dir: Option<String>,
    pub wallet: Option<String>,
    pub contract_id: Option<String>,
    pub seed: Option<u64>,
    pub starting_balance: Option<String>,
    pub block_time_ms: Option<u64>,
    pub decimals: Option<u8>,
    pub ticker: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub variant: ProtocolVariant,
    pub confirmation_timeout: Duration,
    pub log_dir: PathBuf,
    pub denomination: Denomination,
    pub simulation: SimulationConfig,
    pub command: Option<Command>,
}

impl AppConfig {
    pub fn load(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Layers flags over file values over defaults.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let variant = cli.variant.or(file.variant).unwrap_or_default();

        let timeout_secs = cli
            .confirmation_timeout
            .or(file.confirmation_timeout_secs)
            .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT.as_secs());
        ensure!(timeout_secs > 0, "confirmation timeout must be greater than zero");

        let denomination = Denomination::new(
            file.decimals.unwrap_or(DEFAULT_DECIMALS),
            file.ticker.unwrap_or_else(|| DEFAULT_TICKER.to_owned()),
        )
        .wrap_err("Invalid denomination")?;

        let contract = match cli.contract_id.or(file.contract_id) {
            Some(raw) => parse_contract_id(&raw)?,
            None => default_contract_id(),
        };

        let raw_balance = cli
            .starting_balance
            .or(file.starting_balance)
            .unwrap_or_else(|| DEFAULT_STARTING_BALANCE.to_owned());
        let starting_balance = parse_starting_balance(&denomination, &raw_balance)?;

        let log_dir = cli
            .log_dir
            .or(file.log_dir)
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_owned());

        let simulation = SimulationConfig {
            variant,
            contract,
            profile: cli
                .wallet
                .or(file.wallet)
                .unwrap_or_else(|| DEFAULT_PROFILE.to_owned()),
            starting_balance,
            block_time: cli
                .block_time_ms
                .or(file.block_time_ms)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BLOCK_TIME),
            seed: cli.seed.or(file.seed),
            agent_present: !cli.no_agent,
            ..SimulationConfig::default()
        };

        Ok(Self {
            variant,
            confirmation_timeout: Duration::from_secs(timeout_secs),
            log_dir: expand_path(&log_dir),
            denomination,
            simulation,
            command: cli.command,
        })
    }

    /// Wires a session, ledger client and orchestrator over the simulated
    /// ledger described by this configuration.
    pub fn local_orchestrator(
        &self,
    ) -> (Arc<SimulatedLedger>, Arc<WagerOrchestrator<SimulatedLedger>>) {
        let ledger = Arc::new(SimulatedLedger::new(self.simulation.clone()));
        let session = Arc::new(SigningSession::new(ledger.clone()));
        let client = LedgerClient::new(
            session.clone(),
            self.simulation.contract,
            self.variant,
            self.confirmation_timeout,
        );
        let orchestrator =
            WagerOrchestrator::new(session, client, self.denomination.clone());
        (ledger, Arc::new(orchestrator))
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

pub fn parse_contract_id(raw: &str) -> Result<ContractId> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_part)
        .wrap_err_with(|| format!("Invalid contract id hex: {raw}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| eyre!("Contract id must be 32 bytes: {raw}"))?;
    Ok(ContractId::new(bytes))
}

fn parse_starting_balance(denomination: &Denomination, raw: &str) -> Result<Amount> {
    if raw.trim() == "0" {
        return Ok(Amount::ZERO);
    }
    denomination
        .parse(raw)
        .wrap_err("Invalid starting balance")
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("coinflip").chain(args.iter().copied()))
    }

    #[test]
    fn resolve__defaults_without_flags_or_file() {
        // when
        let config = AppConfig::resolve(cli(&[]), FileConfig::default()).unwrap();

        // then
        assert_eq!(config.variant, ProtocolVariant::OneStep);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(config.denomination, Denomination::default());
        assert_eq!(config.simulation.profile, "player");
        assert_eq!(config.simulation.starting_balance, Amount(10_000_000_000));
        assert_eq!(config.simulation.block_time, Duration::from_millis(800));
        assert!(config.simulation.agent_present);
        assert_eq!(config.command, None);
    }

    #[test]
    fn resolve__flags_override_file_values() {
        // given
        let file = FileConfig {
            variant: Some(ProtocolVariant::OneStep),
            confirmation_timeout_secs: Some(30),
            wallet: Some("from-file".into()),
            seed: Some(1),
            ..FileConfig::default()
        };

        // when
        let config = AppConfig::resolve(
            cli(&["--variant", "two-step", "--wallet", "alice", "flip", "--amount", "0.1"]),
            file,
        )
        .unwrap();

        // then
        assert_eq!(config.variant, ProtocolVariant::TwoStep);
        assert_eq!(config.simulation.variant, ProtocolVariant::TwoStep);
        assert_eq!(config.simulation.profile, "alice");
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
        assert_eq!(config.simulation.seed, Some(1));
        assert_eq!(
            config.command,
            Some(Command::Flip {
                amount: "0.1".into(),
                side: Side::Heads
            })
        );
    }

    #[test]
    fn resolve__rejects_zero_timeout() {
        let result = AppConfig::resolve(cli(&["--confirmation-timeout", "0"]), FileConfig::default());

        assert!(result.is_err());
    }

    #[test]
    fn resolve__rejects_too_many_decimals() {
        let file = FileConfig {
            decimals: Some(19),
            ..FileConfig::default()
        };

        assert!(AppConfig::resolve(cli(&[]), file).is_err());
    }

    #[test]
    fn parse_contract_id__requires_32_bytes_of_hex() {
        let valid = format!("0x{}", "ab".repeat(32));

        assert_eq!(parse_contract_id(&valid).unwrap(), ContractId::new([0xab; 32]));
        assert!(parse_contract_id("0x1234").is_err());
        assert!(parse_contract_id("not-hex").is_err());
    }

    #[test]
    fn load__reads_json_file() {
        // given
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"variant": "two-step", "decimals": 6, "ticker": "USDC", "block_time_ms": 10}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        // when
        let config = AppConfig::load(cli(&["--config", &path, "balance"])).unwrap();

        // then
        assert_eq!(config.variant, ProtocolVariant::TwoStep);
        assert_eq!(config.denomination.decimals, 6);
        assert_eq!(config.denomination.ticker, "USDC");
        assert_eq!(config.simulation.block_time, Duration::from_millis(10));
        assert_eq!(config.command, Some(Command::Balance));
    }

    #[test]
    fn load__rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"varient": "two-step"}}"#).unwrap();

        let result = FileConfig::load(file.path());

        assert!(result.is_err());
    }
}
