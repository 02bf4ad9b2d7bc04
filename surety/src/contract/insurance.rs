use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    contract::{
        Error,
        rules::Rules,
        treasury::Transfer,
    },
    models::{Amount, FlightKey, Principal, entries_serde},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub premium: Amount,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub passenger: Principal,
    pub amount: Amount,
    /// Passenger balance after the credit.
    pub balance: Amount,
}

/// Credits computed for one flight but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    flight: FlightKey,
    credits: Vec<Credit>,
}

/// Policies, passenger balances and the currency held in custody.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(with = "entries_serde")]
    policies: BTreeMap<FlightKey, BTreeMap<Principal, Policy>>,
    balances: BTreeMap<Principal, Amount>,
    reserves: Amount,
}

impl Ledger {
    /// Takes currency into custody without owing it to anyone.
    pub fn deposit(&mut self, amount: Amount) -> Result<(), Error> {
        self.reserves = self.reserves.checked_add(amount).ok_or(Error::Overflow)?;
        Ok(())
    }

    /// Adds `premium` to the passenger's policy on `flight`, creating it if
    /// needed. The cap bounds the policy's cumulative premium.
    pub fn buy(
        &mut self,
        passenger: &Principal,
        flight: &FlightKey,
        premium: Amount,
        rules: &Rules,
    ) -> Result<Policy, Error> {
        if premium.is_zero() {
            return Err(Error::InvalidPremium);
        }
        let current = self.policy(flight, passenger).copied().unwrap_or_default();
        let total = current
            .premium
            .checked_add(premium)
            .ok_or(Error::Overflow)?;
        if total > rules.premium_cap {
            return Err(Error::PremiumTooHigh {
                cap: rules.premium_cap,
                requested: total,
            });
        }
        let reserves = self.reserves.checked_add(premium).ok_or(Error::Overflow)?;

        let policy = Policy {
            premium: total,
            claimed: current.claimed,
        };
        self.policies
            .entry(flight.clone())
            .or_default()
            .insert(passenger.clone(), policy);
        self.reserves = reserves;
        Ok(policy)
    }

    /// Computes what settling `flight` would credit, without touching any
    /// balance. Already claimed policies are skipped.
    pub fn plan_credits(&self, flight: &FlightKey, rules: &Rules) -> Result<Settlement, Error> {
        let mut credits = vec![];
        let policies = self.policies.get(flight).into_iter().flatten();
        for (passenger, policy) in policies.filter(|(_, p)| !p.claimed) {
            let amount = policy
                .premium
                .checked_scale(rules.payout_numerator, rules.payout_denominator)
                .ok_or(Error::Overflow)?;
            let balance = self
                .balance(passenger)
                .checked_add(amount)
                .ok_or(Error::Overflow)?;
            credits.push(Credit {
                passenger: passenger.clone(),
                amount,
                balance,
            });
        }
        Ok(Settlement {
            flight: flight.clone(),
            credits,
        })
    }

    /// Applies a settlement computed by [`Ledger::plan_credits`]: marks each
    /// policy claimed and sets the new balance.
    pub(crate) fn apply_credits(&mut self, settlement: Settlement) -> Vec<Credit> {
        let Settlement { flight, credits } = settlement;
        let mut policies = self.policies.get_mut(&flight);
        for credit in &credits {
            if let Some(policy) = policies
                .as_mut()
                .and_then(|policies| policies.get_mut(&credit.passenger))
            {
                policy.claimed = true;
            }
            self.balances
                .insert(credit.passenger.clone(), credit.balance);
        }
        credits
    }

    /// Marks every unclaimed policy on `flight` as claimed and credits its
    /// passenger the scaled premium. A replay credits nothing.
    pub fn credit_insurees(
        &mut self,
        flight: &FlightKey,
        rules: &Rules,
    ) -> Result<Vec<Credit>, Error> {
        let settlement = self.plan_credits(flight, rules)?;
        Ok(self.apply_credits(settlement))
    }

    /// Pays out the passenger's whole balance. The balance and reserves are
    /// debited before the transfer runs; a failed transfer does not restore
    /// them.
    pub fn withdraw<T: Transfer + ?Sized>(
        &mut self,
        passenger: &Principal,
        transfer: &mut T,
    ) -> Result<Amount, Error> {
        let amount = self.balance(passenger);
        if amount.is_zero() {
            return Err(Error::NoBalance {
                passenger: passenger.clone(),
            });
        }
        let reserves =
            self.reserves
                .checked_sub(amount)
                .ok_or_else(|| Error::InsufficientReserves {
                    requested: amount,
                    available: self.reserves,
                })?;

        self.balances.remove(passenger);
        self.reserves = reserves;

        transfer
            .transfer(passenger, amount)
            .map_err(|e| Error::TransferFailed {
                recipient: passenger.clone(),
                amount,
                reason: e.to_string(),
            })?;
        Ok(amount)
    }

    pub fn balance(&self, passenger: &Principal) -> Amount {
        self.balances.get(passenger).copied().unwrap_or_default()
    }

    pub fn policy(&self, flight: &FlightKey, passenger: &Principal) -> Option<&Policy> {
        self.policies.get(flight)?.get(passenger)
    }

    pub fn reserves(&self) -> Amount {
        self.reserves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::treasury::{TransferError, Vault};

    fn flight() -> FlightKey {
        FlightKey::new("air-1", "ND1309", 1_700_000_000)
    }

    struct FailingTransfer;

    impl Transfer for FailingTransfer {
        fn transfer(&mut self, _: &Principal, _: Amount) -> Result<(), TransferError> {
            Err(TransferError("recipient rejected".to_string()))
        }
    }

    #[test]
    fn premium_cap_is_cumulative() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        let half = "0.5".parse().unwrap();
        ledger.buy(&"pax".into(), &flight(), half, &rules).unwrap();
        ledger.buy(&"pax".into(), &flight(), half, &rules).unwrap();
        assert_eq!(
            ledger.policy(&flight(), &"pax".into()).unwrap().premium,
            Amount::units(1)
        );
        assert_eq!(
            ledger.buy(&"pax".into(), &flight(), Amount::from_base(1), &rules),
            Err(Error::PremiumTooHigh {
                cap: Amount::units(1),
                requested: Amount::from_base(Amount::UNIT + 1),
            })
        );
        assert_eq!(ledger.reserves(), Amount::units(1));
    }

    #[test]
    fn rejected_premium_creates_no_policy() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        assert!(matches!(
            ledger.buy(&"pax".into(), &flight(), Amount::units(2), &rules),
            Err(Error::PremiumTooHigh { .. })
        ));
        assert_eq!(
            ledger.buy(&"pax".into(), &flight(), Amount::ZERO, &rules),
            Err(Error::InvalidPremium)
        );
        assert!(ledger.policy(&flight(), &"pax".into()).is_none());
        assert_eq!(ledger.reserves(), Amount::ZERO);
    }

    #[test]
    fn credit_once_at_one_and_a_half() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        ledger
            .buy(&"pax-1".into(), &flight(), Amount::units(1), &rules)
            .unwrap();
        ledger
            .buy(&"pax-2".into(), &flight(), "0.2".parse().unwrap(), &rules)
            .unwrap();

        let credits = ledger.credit_insurees(&flight(), &rules).unwrap();
        assert_eq!(
            credits,
            vec![
                Credit {
                    passenger: "pax-1".into(),
                    amount: "1.5".parse().unwrap(),
                    balance: "1.5".parse().unwrap(),
                },
                Credit {
                    passenger: "pax-2".into(),
                    amount: "0.3".parse().unwrap(),
                    balance: "0.3".parse().unwrap(),
                },
            ]
        );
        assert!(ledger.policy(&flight(), &"pax-1".into()).unwrap().claimed);

        assert!(ledger.credit_insurees(&flight(), &rules).unwrap().is_empty());
        assert_eq!(ledger.balance(&"pax-1".into()), "1.5".parse().unwrap());
        assert_eq!(ledger.balance(&"pax-2".into()), "0.3".parse().unwrap());
    }

    #[test]
    fn plan_leaves_ledger_untouched() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        ledger
            .buy(&"pax".into(), &flight(), Amount::units(1), &rules)
            .unwrap();
        let before = ledger.clone();
        let settlement = ledger.plan_credits(&flight(), &rules).unwrap();
        assert_eq!(settlement.credits.len(), 1);
        assert_eq!(ledger, before);

        let overflowing = Rules {
            payout_numerator: u128::MAX,
            ..Default::default()
        };
        assert_eq!(
            ledger.plan_credits(&flight(), &overflowing),
            Err(Error::Overflow)
        );
    }

    #[test]
    fn credit_without_policies() {
        let mut ledger = Ledger::default();
        assert!(
            ledger
                .credit_insurees(&flight(), &Rules::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn withdraw_drains_balance_once() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        ledger.deposit(Amount::units(10)).unwrap();
        ledger
            .buy(&"pax".into(), &flight(), Amount::units(1), &rules)
            .unwrap();
        ledger.credit_insurees(&flight(), &rules).unwrap();

        let mut vault = Vault::default();
        assert_eq!(
            ledger.withdraw(&"pax".into(), &mut vault),
            Ok("1.5".parse().unwrap())
        );
        assert_eq!(vault.paid_out(&"pax".into()), "1.5".parse().unwrap());
        assert_eq!(ledger.balance(&"pax".into()), Amount::ZERO);
        assert_eq!(ledger.reserves(), "9.5".parse().unwrap());
        assert_eq!(
            ledger.withdraw(&"pax".into(), &mut vault),
            Err(Error::NoBalance {
                passenger: "pax".into()
            })
        );
        assert_eq!(vault.paid_out(&"pax".into()), "1.5".parse().unwrap());
    }

    #[test]
    fn failed_transfer_keeps_balance_zeroed() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        ledger.deposit(Amount::units(10)).unwrap();
        ledger
            .buy(&"pax".into(), &flight(), Amount::units(1), &rules)
            .unwrap();
        ledger.credit_insurees(&flight(), &rules).unwrap();

        assert_eq!(
            ledger.withdraw(&"pax".into(), &mut FailingTransfer),
            Err(Error::TransferFailed {
                recipient: "pax".into(),
                amount: "1.5".parse().unwrap(),
                reason: "recipient rejected".to_string(),
            })
        );
        assert_eq!(ledger.balance(&"pax".into()), Amount::ZERO);
        assert!(matches!(
            ledger.withdraw(&"pax".into(), &mut Vault::default()),
            Err(Error::NoBalance { .. })
        ));
    }

    #[test]
    fn withdraw_beyond_reserves_changes_nothing() {
        let rules = Rules::default();
        let mut ledger = Ledger::default();
        ledger
            .buy(&"pax".into(), &flight(), Amount::units(1), &rules)
            .unwrap();
        ledger.credit_insurees(&flight(), &rules).unwrap();

        let mut vault = Vault::default();
        assert_eq!(
            ledger.withdraw(&"pax".into(), &mut vault),
            Err(Error::InsufficientReserves {
                requested: "1.5".parse().unwrap(),
                available: Amount::units(1),
            })
        );
        assert_eq!(ledger.balance(&"pax".into()), "1.5".parse().unwrap());
        assert_eq!(vault.paid_out(&"pax".into()), Amount::ZERO);
    }
}
