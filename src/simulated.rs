//! An in-process signing agent with the ledger program behind it, for local
//! play and integration tests.

use crate::{
    agent::{
        AgentResult,
        ContractCall,
        EmittedEvent,
        EventValue,
        LedgerMethod,
        PendingTransaction,
        Receipt,
        SigningAgent,
        TxId,
    },
    amount::Amount,
    error::AgentFault,
    ledger_client::{
        OutcomeEvent,
        ProtocolVariant,
    },
};
use fuels::types::{
    Address,
    ContractId,
    Identity,
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_millis(800);
pub const DEFAULT_PROFILE: &str = "player";

const BASE_UNITS_PER_COIN: u64 = 1_000_000_000;

fn sha256_bytes(input: &[u8]) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&Sha256::digest(input));
    bytes
}

/// Address the simulation assigns to a wallet profile name.
pub fn profile_address(profile: &str) -> Address {
    Address::new(sha256_bytes(profile.as_bytes()))
}

/// Identifier the simulated ledger program is deployed under by default.
pub fn default_contract_id() -> ContractId {
    ContractId::new(sha256_bytes(b"coinflip-ledger"))
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub variant: ProtocolVariant,
    pub contract: ContractId,
    pub profile: String,
    pub starting_balance: Amount,
    pub house_bankroll: Amount,
    pub block_time: Duration,
    /// Fixes the coin sequence; entropy from the OS otherwise.
    pub seed: Option<u64>,
    pub agent_present: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::default(),
            contract: default_contract_id(),
            profile: DEFAULT_PROFILE.to_owned(),
            starting_balance: Amount(10 * BASE_UNITS_PER_COIN),
            house_bankroll: Amount(1_000 * BASE_UNITS_PER_COIN),
            block_time: DEFAULT_BLOCK_TIME,
            seed: None,
            agent_present: true,
        }
    }
}

#[derive(Default)]
struct Faults {
    reject_next_prompt: bool,
    drop_next_outcome: bool,
    stall_next_confirmation: bool,
}

struct Chain {
    rng: StdRng,
    wallets: HashMap<Address, Amount>,
    staked: HashMap<Address, Amount>,
    house: Amount,
    mempool: HashMap<TxId, (Address, ContractCall)>,
    nonce: u64,
    block_height: u32,
    agent_present: bool,
    faults: Faults,
}

impl Chain {
    fn ensure_agent(&self) -> AgentResult<()> {
        if self.agent_present {
            Ok(())
        } else {
            Err(AgentFault::Unavailable)
        }
    }

    fn wallet(&self, owner: &Address) -> Amount {
        self.wallets.get(owner).copied().unwrap_or(Amount::ZERO)
    }

    fn debit(&mut self, owner: Address, value: Amount) -> Result<(), String> {
        let remaining = self
            .wallet(&owner)
            .checked_sub(value)
            .ok_or_else(|| "insufficient balance at execution".to_owned())?;
        self.wallets.insert(owner, remaining);
        Ok(())
    }

    fn next_tx_id(&mut self) -> TxId {
        self.nonce += 1;
        TxId(sha256_bytes(&self.nonce.to_be_bytes()))
    }
}

/// Wallet and ledger program simulated in one place.
///
/// Balances live in base units. The house bankroll covers winning flips and
/// collects losing stakes, so wallet, staked and house balances always sum to
/// what the simulation started with. Transactions execute when their
/// confirmation is awaited, one block time after that.
pub struct SimulatedLedger {
    variant: ProtocolVariant,
    contract: ContractId,
    player: Address,
    block_time: Duration,
    chain: Mutex<Chain>,
}

impl SimulatedLedger {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let player = profile_address(&config.profile);
        let mut wallets = HashMap::new();
        wallets.insert(player, config.starting_balance);
        info!(
            profile = %config.profile,
            %player,
            variant = %config.variant,
            "simulated ledger ready"
        );
        Self {
            variant: config.variant,
            contract: config.contract,
            player,
            block_time: config.block_time,
            chain: Mutex::new(Chain {
                rng,
                wallets,
                staked: HashMap::new(),
                house: config.house_bankroll,
                mempool: HashMap::new(),
                nonce: 0,
                block_height: 0,
                agent_present: config.agent_present,
                faults: Faults::default(),
            }),
        }
    }

    fn chain(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn player(&self) -> Address {
        self.player
    }

    pub fn contract(&self) -> ContractId {
        self.contract
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn staked(&self, owner: &Address) -> Amount {
        self.chain()
            .staked
            .get(owner)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn house_bankroll(&self) -> Amount {
        self.chain().house
    }

    pub fn set_agent_present(&self, present: bool) {
        self.chain().agent_present = present;
    }

    /// The user declines the next prompt, connect or signature alike.
    pub fn reject_next_prompt(&self) {
        self.chain().faults.reject_next_prompt = true;
    }

    pub fn drop_next_outcome_event(&self) {
        self.chain().faults.drop_next_outcome = true;
    }

    /// The next confirmation never arrives.
    pub fn stall_next_confirmation(&self) {
        self.chain().faults.stall_next_confirmation = true;
    }

    fn execute(
        &self,
        chain: &mut Chain,
        sender: Address,
        call: &ContractCall,
    ) -> Result<Vec<EmittedEvent>, String> {
        if call.contract != self.contract {
            return Err(format!("no program deployed at {}", call.contract));
        }
        let player = EventValue::Identity(Identity::Address(sender));
        match call.method {
            LedgerMethod::Deposit => {
                if call.value.is_zero() {
                    return Err("deposit requires a non-zero value".into());
                }
                chain.debit(sender, call.value)?;
                let staked = chain
                    .staked
                    .get(&sender)
                    .copied()
                    .unwrap_or(Amount::ZERO)
                    .checked_add(call.value)
                    .ok_or_else(|| "stake overflow".to_owned())?;
                chain.staked.insert(sender, staked);
                Ok(vec![
                    EmittedEvent::new("Deposited")
                        .with_field("player", player)
                        .with_field("amount", EventValue::U64(call.value.units())),
                ])
            }
            LedgerMethod::FlipCoin { choice } => {
                let staked = chain.staked.get(&sender).copied().unwrap_or(Amount::ZERO);
                let stake = match self.variant {
                    ProtocolVariant::TwoStep => {
                        if !call.value.is_zero() {
                            return Err("flipCoin does not accept value".into());
                        }
                        if staked.is_zero() {
                            return Err("nothing staked".into());
                        }
                        staked
                    }
                    ProtocolVariant::OneStep => {
                        if call.value.is_zero() {
                            return Err("flipCoin requires a stake".into());
                        }
                        staked
                            .checked_add(call.value)
                            .ok_or_else(|| "stake overflow".to_owned())?
                    }
                };
                if chain.house < stake {
                    return Err("house cannot cover the payout".into());
                }
                let wallet = chain
                    .wallet(&sender)
                    .checked_sub(call.value)
                    .ok_or_else(|| "insufficient balance at execution".to_owned())?;

                // Nothing is written until every balance has been computed.
                let landed: bool = chain.rng.random();
                let (wallet, house) = if landed == choice {
                    let payout = stake
                        .payout()
                        .ok_or_else(|| "payout overflow".to_owned())?;
                    let wallet = wallet
                        .checked_add(payout)
                        .ok_or_else(|| "balance overflow".to_owned())?;
                    (wallet, Amount(chain.house.units() - stake.units()))
                } else {
                    let house = chain
                        .house
                        .checked_add(stake)
                        .ok_or_else(|| "bankroll overflow".to_owned())?;
                    (wallet, house)
                };
                chain.wallets.insert(sender, wallet);
                chain.staked.remove(&sender);
                chain.house = house;

                let name = match self.variant {
                    ProtocolVariant::TwoStep => "CoinFlipped",
                    ProtocolVariant::OneStep => "CoinFlipResult",
                };
                Ok(vec![
                    EmittedEvent::new(name)
                        .with_field("player", player)
                        .with_field("result", EventValue::Bool(landed))
                        .with_field("amount", EventValue::U64(stake.units())),
                ])
            }
        }
    }
}

impl SigningAgent for SimulatedLedger {
    async fn request_accounts(&self) -> AgentResult<Vec<Address>> {
        let mut chain = self.chain();
        chain.ensure_agent()?;
        if std::mem::take(&mut chain.faults.reject_next_prompt) {
            return Err(AgentFault::Rejected);
        }
        Ok(vec![self.player])
    }

    async fn signer_address(&self) -> AgentResult<Address> {
        self.chain().ensure_agent()?;
        Ok(self.player)
    }

    async fn get_balance(&self, address: &Address) -> AgentResult<Amount> {
        let chain = self.chain();
        chain.ensure_agent()?;
        Ok(chain.wallet(address))
    }

    async fn send_transaction(&self, call: ContractCall) -> AgentResult<PendingTransaction> {
        let mut chain = self.chain();
        chain.ensure_agent()?;
        if std::mem::take(&mut chain.faults.reject_next_prompt) {
            return Err(AgentFault::Rejected);
        }
        if call.value > chain.wallet(&self.player) {
            return Err(AgentFault::InsufficientFunds);
        }
        let tx_id = chain.next_tx_id();
        chain.mempool.insert(tx_id, (self.player, call.clone()));
        debug!(%tx_id, method = call.method.name(), value = %call.value, "accepted into mempool");
        Ok(PendingTransaction { tx_id, call })
    }

    async fn await_confirmation(&self, pending: &PendingTransaction) -> AgentResult<Receipt> {
        let stall = std::mem::take(&mut self.chain().faults.stall_next_confirmation);
        if stall {
            warn!(tx_id = %pending.tx_id, "confirmation stalled");
            futures::future::pending::<()>().await;
        }
        tokio::time::sleep(self.block_time).await;

        let mut chain = self.chain();
        let (sender, call) = chain.mempool.remove(&pending.tx_id).ok_or_else(|| {
            AgentFault::Transport(format!("unknown transaction {}", pending.tx_id))
        })?;
        chain.block_height += 1;
        let block_height = chain.block_height;
        let mut events = self
            .execute(&mut chain, sender, &call)
            .map_err(|reason| {
                info!(tx_id = %pending.tx_id, %reason, "transaction reverted");
                AgentFault::Reverted(reason)
            })?;
        if std::mem::take(&mut chain.faults.drop_next_outcome) {
            events.retain(|event| OutcomeEvent::from_event(event).is_none());
        }
        Ok(Receipt {
            tx_id: pending.tx_id,
            block_height,
            events,
        })
    }
}
