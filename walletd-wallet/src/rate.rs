//! Entry credit rate sources.

use crate::error::WalletError;

/// Supplies the current price of one entry credit in factoshis.
pub trait RateSource: Send + Sync {
    fn ec_rate(&self) -> Result<u64, WalletError>;
}

/// A rate fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(u64);

impl FixedRate {
    pub fn new(factoshis_per_ec: u64) -> Self {
        Self(factoshis_per_ec)
    }
}

impl RateSource for FixedRate {
    fn ec_rate(&self) -> Result<u64, WalletError> {
        if self.0 == 0 {
            return Err(WalletError::RateUnavailable("rate is zero".to_string()));
        }
        Ok(self.0)
    }
}
