use crate::error::{
    Result,
    WagerError,
};
use std::fmt;

pub const DEFAULT_DECIMALS: u8 = 9;
pub const DEFAULT_TICKER: &str = "ETH";
const MAX_DECIMALS: u8 = 18;

/// Published payout ratio of the ledger program.
pub const PAYOUT_MULTIPLIER: u64 = 2;

/// How base units map onto the decimal amounts a user types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Denomination {
    pub decimals: u8,
    pub ticker: String,
}

impl Default for Denomination {
    fn default() -> Self {
        Self {
            decimals: DEFAULT_DECIMALS,
            ticker: DEFAULT_TICKER.to_string(),
        }
    }
}

impl Denomination {
    pub fn new(decimals: u8, ticker: impl Into<String>) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(WagerError::InvalidAmount(format!(
                "at most {MAX_DECIMALS} decimals are supported, got {decimals}"
            )));
        }
        Ok(Self {
            decimals,
            ticker: ticker.into(),
        })
    }

    fn one_unit(&self) -> u64 {
        10u64.pow(u32::from(self.decimals))
    }

    /// Parses a user-typed decimal into a strictly positive amount.
    ///
    /// The amount must also leave room for the win payout, so a stake that
    /// could never be displayed as a payout is rejected here rather than after
    /// it has been sent.
    pub fn parse(&self, raw: &str) -> Result<Amount> {
        let invalid = |why: &str| WagerError::InvalidAmount(format!("{raw:?}: {why}"));
        let text = raw.trim();
        if text.is_empty() {
            return Err(invalid("empty"));
        }
        let (whole, fraction) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid("not a plain positive decimal"));
        }
        if fraction.len() > usize::from(self.decimals) {
            return Err(invalid(&format!(
                "more than {} fractional digits",
                self.decimals
            )));
        }

        let overflow = || invalid("too large");
        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .map_err(|_| overflow())?
                .checked_mul(self.one_unit())
                .ok_or_else(overflow)?
        };
        let fraction_units = if fraction.is_empty() {
            0
        } else {
            let scale = 10u64.pow(u32::from(self.decimals) - fraction.len() as u32);
            fraction.parse::<u64>().map_err(|_| overflow())? * scale
        };
        let units = whole_units.checked_add(fraction_units).ok_or_else(overflow)?;
        if units == 0 {
            return Err(invalid("must be greater than zero"));
        }
        if units.checked_mul(PAYOUT_MULTIPLIER).is_none() {
            return Err(overflow());
        }
        Ok(Amount(units))
    }

    /// Renders base units as a decimal with trailing zeros trimmed.
    pub fn format(&self, amount: Amount) -> String {
        let one_unit = self.one_unit();
        let whole = amount.0 / one_unit;
        let fractional = amount.0 % one_unit;
        if fractional == 0 {
            format!("{whole}")
        } else {
            let width = usize::from(self.decimals);
            format!(
                "{}.{}",
                whole,
                format!("{fractional:0width$}").trim_end_matches('0')
            )
        }
    }

    pub fn format_with_ticker(&self, amount: Amount) -> String {
        format!("{} {}", self.format(amount), self.ticker)
    }
}

/// A value in base units of the ledger's native asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Stake times the published payout ratio.
    pub fn payout(self) -> Option<Amount> {
        self.0.checked_mul(PAYOUT_MULTIPLIER).map(Amount)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
