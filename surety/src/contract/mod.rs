//! The insurance contract: airline membership, flights, policies and the
//! reporter quorum that settles them.
//!
//! [`Contract`] is the only entry point. Every operation takes the calling
//! principal explicitly and either commits all of its effects or none of
//! them. Committed operations hand back the [`Notification`]s they emitted.

mod error;
pub mod flights;
pub mod insurance;
pub mod membership;
pub mod oracle;
pub mod rules;
mod switch;
pub mod treasury;

use serde::{Deserialize, Serialize};

pub use self::{
    error::Error,
    flights::Flight,
    insurance::Policy,
    membership::{Admission, AirlineStatus, Ballot},
    oracle::{Opening, ReporterRegistry, ReporterSet, RequestState, Response, StatusRequest},
    rules::{ApprovalBasis, Rules},
    treasury::{Transfer, TransferError, Vault},
};
use self::switch::OperationalSwitch;
use crate::models::{Amount, FlightKey, Principal, StatusCode};

/// Emitted by committed operations for whoever displays the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    OperationalStatusChanged {
        operational: bool,
    },
    AirlineRegistered {
        airline: Principal,
        approved: bool,
    },
    VoteCast {
        airline: Principal,
        voter: Principal,
        votes: usize,
    },
    AirlineApproved {
        airline: Principal,
        votes: usize,
    },
    AirlineFunded {
        airline: Principal,
        amount: Amount,
    },
    FlightRegistered {
        flight: FlightKey,
    },
    InsurancePurchased {
        flight: FlightKey,
        passenger: Principal,
        premium: Amount,
    },
    StatusRequested {
        flight: FlightKey,
        requester: Principal,
    },
    OracleReported {
        flight: FlightKey,
        reporter: Principal,
        status: StatusCode,
    },
    FlightStatusResolved {
        flight: FlightKey,
        status: StatusCode,
    },
    PassengerCredited {
        flight: FlightKey,
        passenger: Principal,
        amount: Amount,
        balance: Amount,
    },
    PassengerWithdrew {
        passenger: Principal,
        amount: Amount,
    },
    ReporterAdmitted {
        reporter: Principal,
    },
    ReporterRevoked {
        reporter: Principal,
    },
}

/// Result of a committed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

impl<T> Receipt<T> {
    fn new(value: T, notifications: Vec<Notification>) -> Self {
        Self {
            value,
            notifications,
        }
    }

    fn silent(value: T) -> Self {
        Self::new(value, vec![])
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Receipt<U> {
        Receipt {
            value: f(self.value),
            notifications: self.notifications,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    rules: Rules,
    switch: OperationalSwitch,
    airlines: membership::Registry,
    flights: flights::Registry,
    insurance: insurance::Ledger,
    oracle: oracle::Consensus,
    reporters: ReporterSet,
}

impl Contract {
    /// Creates an operational contract administered by `admin`, who is also
    /// the first (approved, unfunded) airline.
    pub fn new(admin: Principal, rules: Rules) -> Self {
        Self {
            rules,
            airlines: membership::Registry::with_genesis(admin.clone()),
            switch: OperationalSwitch::new(admin),
            flights: Default::default(),
            insurance: Default::default(),
            oracle: Default::default(),
            reporters: Default::default(),
        }
    }

    pub fn with_reporters(mut self, reporters: impl IntoIterator<Item = Principal>) -> Self {
        for reporter in reporters {
            self.reporters.admit(reporter);
        }
        self
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn admin(&self) -> &Principal {
        self.switch.admin()
    }

    // Operational switch

    pub fn is_operational(&self) -> bool {
        self.switch.is_operational()
    }

    pub fn set_operational_status(
        &mut self,
        caller: &Principal,
        operational: bool,
    ) -> Result<Receipt<()>, Error> {
        if self.switch.set(caller, operational)? {
            Ok(Receipt::new(
                (),
                vec![Notification::OperationalStatusChanged { operational }],
            ))
        } else {
            Ok(Receipt::silent(()))
        }
    }

    // Membership

    pub fn register_airline(
        &mut self,
        caller: &Principal,
        candidate: &Principal,
    ) -> Result<Receipt<Admission>, Error> {
        self.switch.ensure_operational()?;
        let admission = self.airlines.register(caller, candidate, &self.rules)?;
        Ok(Receipt::new(
            admission,
            vec![Notification::AirlineRegistered {
                airline: candidate.clone(),
                approved: admission == Admission::Approved,
            }],
        ))
    }

    pub fn vote_airline(
        &mut self,
        caller: &Principal,
        candidate: &Principal,
    ) -> Result<Receipt<Ballot>, Error> {
        self.switch.ensure_operational()?;
        let ballot = self.airlines.vote(caller, candidate, &self.rules)?;
        let notifications = match ballot {
            Ballot::Counted { votes, .. } => vec![Notification::VoteCast {
                airline: candidate.clone(),
                voter: caller.clone(),
                votes,
            }],
            Ballot::Approved { votes } => vec![
                Notification::VoteCast {
                    airline: candidate.clone(),
                    voter: caller.clone(),
                    votes,
                },
                Notification::AirlineApproved {
                    airline: candidate.clone(),
                    votes,
                },
            ],
            Ballot::AlreadyVoted => vec![],
        };
        Ok(Receipt::new(ballot, notifications))
    }

    /// `value` is the currency attached to the call.
    pub fn fund_airline(&mut self, caller: &Principal, value: Amount) -> Result<Receipt<()>, Error> {
        self.switch.ensure_operational()?;
        // Reserve headroom is checked before the airline is flagged.
        self.insurance
            .reserves()
            .checked_add(value)
            .ok_or(Error::Overflow)?;
        self.airlines.fund(caller, value, &self.rules)?;
        self.insurance.deposit(value)?;
        Ok(Receipt::new(
            (),
            vec![Notification::AirlineFunded {
                airline: caller.clone(),
                amount: value,
            }],
        ))
    }

    pub fn airlines_count(&self) -> usize {
        self.airlines.count()
    }

    pub fn is_airline_registered(&self, airline: &Principal) -> bool {
        self.airlines.is_registered(airline)
    }

    pub fn is_airline_approved(&self, airline: &Principal) -> bool {
        self.airlines.is_approved(airline)
    }

    pub fn is_airline_funded(&self, airline: &Principal) -> bool {
        self.airlines.is_funded(airline)
    }

    pub fn is_airline_registered_approved_and_funded(&self, airline: &Principal) -> bool {
        self.airlines.is_registered_approved_and_funded(airline)
    }

    pub fn airline(&self, airline: &Principal) -> Option<AirlineStatus> {
        self.airlines.status(airline)
    }

    // Flights

    pub fn register_flight(
        &mut self,
        caller: &Principal,
        airline: &Principal,
        code: &str,
        departure: u64,
    ) -> Result<Receipt<FlightKey>, Error> {
        self.switch.ensure_operational()?;
        if caller != airline || !self.airlines.is_registered_approved_and_funded(airline) {
            return Err(Error::unauthorized(caller));
        }
        let key = FlightKey::new(airline.clone(), code, departure);
        self.flights.register(key.clone())?;
        Ok(Receipt::new(
            key.clone(),
            vec![Notification::FlightRegistered { flight: key }],
        ))
    }

    pub fn is_flight_registered(&self, code: &str, departure: u64) -> bool {
        self.flights.is_registered(code, departure)
    }

    pub fn flight(&self, flight: &FlightKey) -> Option<&Flight> {
        self.flights.get(flight)
    }

    // Insurance

    /// The caller is the passenger; `value` is the premium attached to the call.
    pub fn buy_insurance(
        &mut self,
        caller: &Principal,
        flight: &FlightKey,
        value: Amount,
    ) -> Result<Receipt<Policy>, Error> {
        self.switch.ensure_operational()?;
        let registered = self.flights.ensure_exists(flight)?;
        if registered.status != StatusCode::Unknown {
            return Err(Error::FlightAlreadyResolved {
                flight: flight.clone(),
            });
        }
        let policy = self.insurance.buy(caller, flight, value, &self.rules)?;
        Ok(Receipt::new(
            policy,
            vec![Notification::InsurancePurchased {
                flight: flight.clone(),
                passenger: caller.clone(),
                premium: policy.premium,
            }],
        ))
    }

    pub fn passenger_balance(&self, passenger: &Principal) -> Amount {
        self.insurance.balance(passenger)
    }

    pub fn policy(&self, flight: &FlightKey, passenger: &Principal) -> Option<&Policy> {
        self.insurance.policy(flight, passenger)
    }

    pub fn reserves(&self) -> Amount {
        self.insurance.reserves()
    }

    /// Pays the caller's whole balance through `transfer`. The balance is
    /// zeroed before the transfer is attempted and stays zeroed if it fails.
    pub fn passenger_withdraw<T: Transfer + ?Sized>(
        &mut self,
        caller: &Principal,
        transfer: &mut T,
    ) -> Result<Receipt<Amount>, Error> {
        self.switch.ensure_operational()?;
        let amount = self.insurance.withdraw(caller, transfer)?;
        Ok(Receipt::new(
            amount,
            vec![Notification::PassengerWithdrew {
                passenger: caller.clone(),
                amount,
            }],
        ))
    }

    // Oracle consensus

    pub fn request_flight_status(
        &mut self,
        caller: &Principal,
        flight: &FlightKey,
    ) -> Result<Receipt<Opening>, Error> {
        self.switch.ensure_operational()?;
        self.flights.ensure_exists(flight)?;
        let opening = self.oracle.open(flight);
        let notifications = match opening {
            Opening::Opened => vec![Notification::StatusRequested {
                flight: flight.clone(),
                requester: caller.clone(),
            }],
            _ => vec![],
        };
        Ok(Receipt::new(opening, notifications))
    }

    /// Records a reporter's answer. When the answer completes a quorum the
    /// flight status is set, and a late-airline verdict credits every
    /// unclaimed policy on the flight.
    pub fn submit_oracle_response(
        &mut self,
        reporter: &Principal,
        flight: &FlightKey,
        status: StatusCode,
    ) -> Result<Receipt<Response>, Error> {
        self.switch.ensure_operational()?;
        let quorum = self.rules.quorum;
        let response = self
            .oracle
            .evaluate(&self.reporters, reporter, flight, status, quorum)?;

        let settlement = match response {
            Response::Resolved { status } => {
                self.flights.ensure_exists(flight)?;
                status
                    .pays_out()
                    .then(|| self.insurance.plan_credits(flight, &self.rules))
                    .transpose()?
            }
            _ => None,
        };

        self.oracle
            .submit(&self.reporters, reporter, flight, status, quorum)?;
        let mut notifications = vec![];
        if let Response::Duplicate { .. } = response {
            return Ok(Receipt::new(response, notifications));
        }
        notifications.push(Notification::OracleReported {
            flight: flight.clone(),
            reporter: reporter.clone(),
            status,
        });

        if let Response::Resolved { status } = response {
            self.flights.set_status(flight, status)?;
            notifications.push(Notification::FlightStatusResolved {
                flight: flight.clone(),
                status,
            });
            if let Some(settlement) = settlement {
                notifications.extend(self.insurance.apply_credits(settlement).into_iter().map(
                    |credit| Notification::PassengerCredited {
                        flight: flight.clone(),
                        passenger: credit.passenger,
                        amount: credit.amount,
                        balance: credit.balance,
                    },
                ));
            }
        }
        Ok(Receipt::new(response, notifications))
    }

    pub fn status_request(&self, flight: &FlightKey) -> Option<&StatusRequest> {
        self.oracle.request(flight)
    }

    // Reporter administration

    pub fn admit_reporter(
        &mut self,
        caller: &Principal,
        reporter: &Principal,
    ) -> Result<Receipt<bool>, Error> {
        self.switch.ensure_operational()?;
        self.switch.ensure_admin(caller)?;
        if self.reporters.admit(reporter.clone()) {
            Ok(Receipt::new(
                true,
                vec![Notification::ReporterAdmitted {
                    reporter: reporter.clone(),
                }],
            ))
        } else {
            Ok(Receipt::silent(false))
        }
    }

    pub fn revoke_reporter(
        &mut self,
        caller: &Principal,
        reporter: &Principal,
    ) -> Result<Receipt<bool>, Error> {
        self.switch.ensure_operational()?;
        self.switch.ensure_admin(caller)?;
        if self.reporters.revoke(reporter) {
            Ok(Receipt::new(
                true,
                vec![Notification::ReporterRevoked {
                    reporter: reporter.clone(),
                }],
            ))
        } else {
            Ok(Receipt::silent(false))
        }
    }

    pub fn is_reporter(&self, reporter: &Principal) -> bool {
        self.reporters.is_recognized(reporter)
    }

    pub fn reporters(&self) -> &ReporterSet {
        &self.reporters
    }

    pub fn reporters_count(&self) -> usize {
        self.reporters.len()
    }
}
