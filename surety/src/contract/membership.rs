use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    contract::{
        Error,
        rules::{ApprovalBasis, Rules},
    },
    models::{Amount, Principal},
};

/// A registered airline. Being present in the [`Registry`] means registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Airline {
    approved: bool,
    funded: bool,
    /// Funded airlines that voted for this one while it was pending.
    voters: BTreeSet<Principal>,
}

/// Read-only view of an airline's standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirlineStatus {
    pub airline: Principal,
    pub approved: bool,
    pub funded: bool,
    pub votes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Admission {
    /// Admitted during bootstrap, no vote needed.
    Approved,
    /// Registered with zero votes.
    PendingVotes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ballot", rename_all = "camelCase")]
pub enum Ballot {
    /// Vote recorded, candidate still pending.
    Counted { votes: usize, basis: usize },
    /// This vote pushed the candidate over the majority.
    Approved { votes: usize },
    /// The caller had already voted for this candidate. Nothing changed.
    AlreadyVoted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    airlines: BTreeMap<Principal, Airline>,
}

impl Registry {
    /// Creates a registry whose only member is `genesis`, registered and
    /// approved but not yet funded.
    pub fn with_genesis(genesis: Principal) -> Self {
        let mut airlines = BTreeMap::new();
        airlines.insert(
            genesis,
            Airline {
                approved: true,
                ..Default::default()
            },
        );
        Self { airlines }
    }

    pub fn register(
        &mut self,
        caller: &Principal,
        candidate: &Principal,
        rules: &Rules,
    ) -> Result<Admission, Error> {
        if !self.is_registered_approved_and_funded(caller) {
            return Err(Error::unauthorized(caller));
        }
        if self.is_registered(candidate) {
            return Err(Error::AlreadyRegistered {
                airline: candidate.clone(),
            });
        }

        let admission = if self.approved_count() < rules.bootstrap_airlines {
            Admission::Approved
        } else {
            Admission::PendingVotes
        };
        self.airlines.insert(
            candidate.clone(),
            Airline {
                approved: admission == Admission::Approved,
                ..Default::default()
            },
        );
        Ok(admission)
    }

    pub fn vote(
        &mut self,
        caller: &Principal,
        candidate: &Principal,
        rules: &Rules,
    ) -> Result<Ballot, Error> {
        if !self.is_funded(caller) || caller == candidate {
            return Err(Error::unauthorized(caller));
        }
        let basis = self.basis_count(rules.approval_basis);
        let airline = self
            .airlines
            .get_mut(candidate)
            .filter(|airline| !airline.approved)
            .ok_or_else(|| Error::NotAwaitingApproval {
                airline: candidate.clone(),
            })?;

        if !airline.voters.insert(caller.clone()) {
            return Ok(Ballot::AlreadyVoted);
        }
        let votes = airline.voters.len();
        if Rules::is_majority(votes, basis) {
            airline.approved = true;
            Ok(Ballot::Approved { votes })
        } else {
            Ok(Ballot::Counted { votes, basis })
        }
    }

    pub fn fund(&mut self, caller: &Principal, value: Amount, rules: &Rules) -> Result<(), Error> {
        let airline = self
            .airlines
            .get_mut(caller)
            .ok_or_else(|| Error::unauthorized(caller))?;
        if airline.funded {
            return Err(Error::AlreadyFunded {
                airline: caller.clone(),
            });
        }
        if value != rules.funding_amount {
            return Err(Error::InvalidFundingAmount {
                expected: rules.funding_amount,
                received: value,
            });
        }
        airline.funded = true;
        Ok(())
    }

    pub fn is_registered(&self, airline: &Principal) -> bool {
        self.airlines.contains_key(airline)
    }

    pub fn is_approved(&self, airline: &Principal) -> bool {
        self.airlines.get(airline).is_some_and(|a| a.approved)
    }

    pub fn is_funded(&self, airline: &Principal) -> bool {
        self.airlines.get(airline).is_some_and(|a| a.funded)
    }

    pub fn is_registered_approved_and_funded(&self, airline: &Principal) -> bool {
        self.airlines
            .get(airline)
            .is_some_and(|a| a.approved && a.funded)
    }

    /// Number of registered airlines, pending ones included.
    pub fn count(&self) -> usize {
        self.airlines.len()
    }

    pub fn approved_count(&self) -> usize {
        self.airlines.values().filter(|a| a.approved).count()
    }

    pub fn funded_count(&self) -> usize {
        self.airlines.values().filter(|a| a.funded).count()
    }

    pub fn status(&self, airline: &Principal) -> Option<AirlineStatus> {
        self.airlines.get(airline).map(|a| AirlineStatus {
            airline: airline.clone(),
            approved: a.approved,
            funded: a.funded,
            votes: a.voters.len(),
        })
    }

    fn basis_count(&self, basis: ApprovalBasis) -> usize {
        match basis {
            ApprovalBasis::Registered => self.count(),
            ApprovalBasis::Funded => self.funded_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: &str = "genesis";

    fn funded_genesis(rules: &Rules) -> Registry {
        let mut registry = Registry::with_genesis(GENESIS.into());
        registry
            .fund(&GENESIS.into(), rules.funding_amount, rules)
            .unwrap();
        registry
    }

    #[test]
    fn genesis_is_approved_but_not_funded() {
        let registry = Registry::with_genesis(GENESIS.into());
        assert!(registry.is_registered(&GENESIS.into()));
        assert!(registry.is_approved(&GENESIS.into()));
        assert!(!registry.is_funded(&GENESIS.into()));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unfunded_airline_cannot_register() {
        let rules = Rules::default();
        let mut registry = Registry::with_genesis(GENESIS.into());
        assert_eq!(
            registry.register(&GENESIS.into(), &"a2".into(), &rules),
            Err(Error::Unauthorized {
                principal: GENESIS.into()
            })
        );
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn bootstrap_then_pending() {
        let rules = Rules::default();
        let mut registry = funded_genesis(&rules);
        for candidate in ["a2", "a3", "a4"] {
            assert_eq!(
                registry.register(&GENESIS.into(), &candidate.into(), &rules),
                Ok(Admission::Approved)
            );
        }
        assert_eq!(registry.approved_count(), 4);
        assert_eq!(
            registry.register(&GENESIS.into(), &"a5".into(), &rules),
            Ok(Admission::PendingVotes)
        );
        assert_eq!(registry.count(), 5);
        assert!(registry.is_registered(&"a5".into()));
        assert!(!registry.is_approved(&"a5".into()));
        assert_eq!(registry.status(&"a5".into()).unwrap().votes, 0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let rules = Rules::default();
        let mut registry = funded_genesis(&rules);
        registry
            .register(&GENESIS.into(), &"a2".into(), &rules)
            .unwrap();
        assert_eq!(
            registry.register(&GENESIS.into(), &"a2".into(), &rules),
            Err(Error::AlreadyRegistered {
                airline: "a2".into()
            })
        );
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn funding_requires_exact_amount_once() {
        let rules = Rules::default();
        let mut registry = Registry::with_genesis(GENESIS.into());
        assert_eq!(
            registry.fund(&GENESIS.into(), Amount::units(9), &rules),
            Err(Error::InvalidFundingAmount {
                expected: Amount::units(10),
                received: Amount::units(9),
            })
        );
        assert!(!registry.is_funded(&GENESIS.into()));
        registry
            .fund(&GENESIS.into(), Amount::units(10), &rules)
            .unwrap();
        assert_eq!(
            registry.fund(&GENESIS.into(), Amount::units(10), &rules),
            Err(Error::AlreadyFunded {
                airline: GENESIS.into()
            })
        );
        assert_eq!(
            registry.fund(&"stranger".into(), Amount::units(10), &rules),
            Err(Error::Unauthorized {
                principal: "stranger".into()
            })
        );
    }

    #[test]
    fn strict_majority_of_registered() {
        let rules = Rules::default();
        let mut registry = funded_genesis(&rules);
        for candidate in ["a2", "a3", "a4", "a5"] {
            registry
                .register(&GENESIS.into(), &candidate.into(), &rules)
                .unwrap();
        }
        for funder in ["a2", "a3"] {
            registry
                .fund(&funder.into(), rules.funding_amount, &rules)
                .unwrap();
        }

        // 5 registered: 2 votes is not a majority, 3 is.
        assert_eq!(
            registry.vote(&GENESIS.into(), &"a5".into(), &rules),
            Ok(Ballot::Counted { votes: 1, basis: 5 })
        );
        assert_eq!(
            registry.vote(&"a2".into(), &"a5".into(), &rules),
            Ok(Ballot::Counted { votes: 2, basis: 5 })
        );
        assert!(!registry.is_approved(&"a5".into()));
        assert_eq!(
            registry.vote(&"a3".into(), &"a5".into(), &rules),
            Ok(Ballot::Approved { votes: 3 })
        );
        assert!(registry.is_approved(&"a5".into()));
        assert_eq!(
            registry.vote(&"a3".into(), &"a5".into(), &rules),
            Err(Error::NotAwaitingApproval {
                airline: "a5".into()
            })
        );
    }

    #[test]
    fn ties_do_not_approve_with_funded_basis() {
        let rules = Rules {
            approval_basis: ApprovalBasis::Funded,
            ..Default::default()
        };
        let mut registry = funded_genesis(&rules);
        for candidate in ["a2", "a3", "a4", "a5"] {
            registry
                .register(&GENESIS.into(), &candidate.into(), &rules)
                .unwrap();
        }
        for funder in ["a2", "a3", "a4"] {
            registry
                .fund(&funder.into(), rules.funding_amount, &rules)
                .unwrap();
        }

        // 4 funded: 2 votes tie, 3 approve.
        registry.vote(&GENESIS.into(), &"a5".into(), &rules).unwrap();
        assert_eq!(
            registry.vote(&"a2".into(), &"a5".into(), &rules),
            Ok(Ballot::Counted { votes: 2, basis: 4 })
        );
        assert_eq!(
            registry.vote(&"a3".into(), &"a5".into(), &rules),
            Ok(Ballot::Approved { votes: 3 })
        );
    }

    #[test]
    fn repeated_vote_is_a_no_op() {
        let rules = Rules::default();
        let mut registry = funded_genesis(&rules);
        for candidate in ["a2", "a3", "a4", "a5"] {
            registry
                .register(&GENESIS.into(), &candidate.into(), &rules)
                .unwrap();
        }
        registry.vote(&GENESIS.into(), &"a5".into(), &rules).unwrap();
        assert_eq!(
            registry.vote(&GENESIS.into(), &"a5".into(), &rules),
            Ok(Ballot::AlreadyVoted)
        );
        assert_eq!(registry.status(&"a5".into()).unwrap().votes, 1);
    }

    #[test]
    fn unfunded_or_self_votes_are_rejected() {
        let rules = Rules::default();
        let mut registry = funded_genesis(&rules);
        for candidate in ["a2", "a3", "a4", "a5"] {
            registry
                .register(&GENESIS.into(), &candidate.into(), &rules)
                .unwrap();
        }
        assert_eq!(
            registry.vote(&"a2".into(), &"a5".into(), &rules),
            Err(Error::Unauthorized {
                principal: "a2".into()
            })
        );
        registry
            .fund(&"a5".into(), rules.funding_amount, &rules)
            .unwrap();
        assert_eq!(
            registry.vote(&"a5".into(), &"a5".into(), &rules),
            Err(Error::Unauthorized {
                principal: "a5".into()
            })
        );
        assert_eq!(
            registry.vote(&GENESIS.into(), &"nobody".into(), &rules),
            Err(Error::NotAwaitingApproval {
                airline: "nobody".into()
            })
        );
        assert_eq!(registry.status(&"a5".into()).unwrap().votes, 0);
    }
}
