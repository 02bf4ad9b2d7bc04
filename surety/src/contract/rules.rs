use serde::{Deserialize, Serialize};

use crate::models::Amount;

/// Fixed parameters of the consortium. Every field has a serde default, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Rules {
    /// Approved airlines admitted without a vote.
    pub bootstrap_airlines: usize,
    /// What the vote tally is compared against.
    pub approval_basis: ApprovalBasis,
    /// Exact stake an airline deposits to become funded.
    pub funding_amount: Amount,
    /// Upper bound on the cumulative premium of one policy.
    pub premium_cap: Amount,
    pub payout_numerator: u128,
    pub payout_denominator: u128,
    /// Matching reporter responses needed to resolve a flight status.
    pub quorum: usize,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            bootstrap_airlines: 4,
            approval_basis: ApprovalBasis::Registered,
            funding_amount: Amount::units(10),
            premium_cap: Amount::units(1),
            payout_numerator: 3,
            payout_denominator: 2,
            quorum: 3,
        }
    }
}

impl Rules {
    pub fn validate(&self) -> Result<(), String> {
        if self.bootstrap_airlines == 0 {
            return Err("bootstrapAirlines must be at least 1".to_string());
        }
        if self.quorum == 0 {
            return Err("quorum must be at least 1".to_string());
        }
        if self.payout_denominator == 0 {
            return Err("payoutDenominator must not be zero".to_string());
        }
        if self.funding_amount.is_zero() {
            return Err("fundingAmount must not be zero".to_string());
        }
        Ok(())
    }

    /// True when `votes` is a strict majority of `basis`.
    pub fn is_majority(votes: usize, basis: usize) -> bool {
        votes.saturating_mul(2) > basis
    }
}

/// The population whose strict majority approves a pending airline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalBasis {
    /// Every registered airline, approved or not.
    Registered,
    /// Only airlines that deposited their stake.
    Funded,
}
