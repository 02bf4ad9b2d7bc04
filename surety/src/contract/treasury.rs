use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Amount, Principal};

/// Moves native currency out of the contract's custody. Provided by the host
/// platform.
pub trait Transfer {
    fn transfer(&mut self, recipient: &Principal, amount: Amount) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransferError(pub String);

/// In-process custody that records what has been paid out to whom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    paid_out: BTreeMap<Principal, Amount>,
}

impl Vault {
    pub fn paid_out(&self, recipient: &Principal) -> Amount {
        self.paid_out.get(recipient).copied().unwrap_or_default()
    }
}

impl Transfer for Vault {
    fn transfer(&mut self, recipient: &Principal, amount: Amount) -> Result<(), TransferError> {
        let total = self.paid_out.entry(recipient.clone()).or_default();
        *total = total
            .checked_add(amount)
            .ok_or_else(|| TransferError("payout total overflow".to_string()))?;
        Ok(())
    }
}
