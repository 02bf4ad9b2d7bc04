use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    contract::Error,
    models::{FlightKey, Principal, StatusCode, entries_serde},
};

/// Decides whether a principal may answer status requests. Selection and
/// staking of reporters happen outside the contract.
pub trait ReporterRegistry {
    fn is_recognized(&self, reporter: &Principal) -> bool;
}

/// Allowlist of reporters managed by the administrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReporterSet(BTreeSet<Principal>);

impl ReporterSet {
    /// Returns false if the reporter was already admitted.
    pub fn admit(&mut self, reporter: Principal) -> bool {
        self.0.insert(reporter)
    }

    /// Returns false if the reporter was not admitted.
    pub fn revoke(&mut self, reporter: &Principal) -> bool {
        self.0.remove(reporter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Principal> for ReporterSet {
    fn from_iter<I: IntoIterator<Item = Principal>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ReporterRegistry for ReporterSet {
    fn is_recognized(&self, reporter: &Principal) -> bool {
        self.0.contains(reporter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RequestState {
    Open,
    Closed { status: StatusCode },
}

/// Responses collected for one flight. Each status code keeps its own set of
/// reporters, so an early minority answer never absorbs later votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    state: RequestState,
    #[serde(with = "entries_serde")]
    responses: BTreeMap<StatusCode, BTreeSet<Principal>>,
}

impl StatusRequest {
    fn new() -> Self {
        Self {
            state: RequestState::Open,
            responses: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn tally(&self, status: StatusCode) -> usize {
        self.responses.get(&status).map_or(0, BTreeSet::len)
    }

    pub fn tallies(&self) -> impl Iterator<Item = (StatusCode, usize)> + '_ {
        self.responses
            .iter()
            .map(|(status, reporters)| (*status, reporters.len()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "opening", rename_all = "camelCase")]
pub enum Opening {
    Opened,
    AlreadyOpen,
    AlreadyClosed { status: StatusCode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "camelCase")]
pub enum Response {
    /// Counted towards `status`, quorum not reached yet.
    Recorded { status: StatusCode, tally: usize },
    /// This reporter had already answered `status`.
    Duplicate { status: StatusCode },
    /// Quorum reached; the request is now closed.
    Resolved { status: StatusCode },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    #[serde(with = "entries_serde")]
    requests: BTreeMap<FlightKey, StatusRequest>,
}

impl Consensus {
    pub fn open(&mut self, flight: &FlightKey) -> Opening {
        match self.requests.get(flight).map(StatusRequest::state) {
            Some(RequestState::Open) => Opening::AlreadyOpen,
            Some(RequestState::Closed { status }) => Opening::AlreadyClosed { status },
            None => {
                self.requests.insert(flight.clone(), StatusRequest::new());
                Opening::Opened
            }
        }
    }

    /// Checks a response and reports what submitting it would do, without
    /// recording anything.
    pub fn evaluate<R: ReporterRegistry + ?Sized>(
        &self,
        registry: &R,
        reporter: &Principal,
        flight: &FlightKey,
        status: StatusCode,
        quorum: usize,
    ) -> Result<Response, Error> {
        let request = self
            .requests
            .get(flight)
            .ok_or_else(|| Error::RequestNotOpen {
                flight: flight.clone(),
            })?;
        if let RequestState::Closed { .. } = request.state {
            return Err(Error::RequestClosed {
                flight: flight.clone(),
            });
        }
        if !registry.is_recognized(reporter) {
            return Err(Error::UnauthorizedReporter {
                reporter: reporter.clone(),
            });
        }
        if status == StatusCode::Unknown {
            return Err(Error::InvalidStatus { status });
        }

        if request
            .responses
            .get(&status)
            .is_some_and(|reporters| reporters.contains(reporter))
        {
            return Ok(Response::Duplicate { status });
        }
        let tally = request.tally(status) + 1;
        if tally >= quorum {
            Ok(Response::Resolved { status })
        } else {
            Ok(Response::Recorded { status, tally })
        }
    }

    /// Records a response. Reaching quorum closes the request.
    pub fn submit<R: ReporterRegistry + ?Sized>(
        &mut self,
        registry: &R,
        reporter: &Principal,
        flight: &FlightKey,
        status: StatusCode,
        quorum: usize,
    ) -> Result<Response, Error> {
        let response = self.evaluate(registry, reporter, flight, status, quorum)?;
        if let Response::Duplicate { .. } = response {
            return Ok(response);
        }
        let request = self
            .requests
            .get_mut(flight)
            .ok_or_else(|| Error::RequestNotOpen {
                flight: flight.clone(),
            })?;
        request
            .responses
            .entry(status)
            .or_default()
            .insert(reporter.clone());
        if let Response::Resolved { status } = response {
            request.state = RequestState::Closed { status };
        }
        Ok(response)
    }

    pub fn request(&self, flight: &FlightKey) -> Option<&StatusRequest> {
        self.requests.get(flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight() -> FlightKey {
        FlightKey::new("air-1", "ND1309", 1_700_000_000)
    }

    fn reporters() -> ReporterSet {
        ["r1", "r2", "r3", "r4", "r5"]
            .into_iter()
            .map(Principal::from)
            .collect()
    }

    #[test]
    fn open_is_idempotent() {
        let mut consensus = Consensus::default();
        assert_eq!(consensus.open(&flight()), Opening::Opened);
        assert_eq!(consensus.open(&flight()), Opening::AlreadyOpen);
    }

    #[test]
    fn absent_request_is_not_open() {
        let mut consensus = Consensus::default();
        assert_eq!(
            consensus.submit(&reporters(), &"r1".into(), &flight(), StatusCode::OnTime, 3),
            Err(Error::RequestNotOpen { flight: flight() })
        );
    }

    #[test]
    fn unknown_reporter_is_rejected() {
        let mut consensus = Consensus::default();
        consensus.open(&flight());
        assert_eq!(
            consensus.submit(&reporters(), &"rogue".into(), &flight(), StatusCode::OnTime, 3),
            Err(Error::UnauthorizedReporter {
                reporter: "rogue".into()
            })
        );
        assert_eq!(
            consensus.request(&flight()).unwrap().tally(StatusCode::OnTime),
            0
        );
    }

    #[test]
    fn first_code_to_reach_quorum_wins() {
        let registry = reporters();
        let mut consensus = Consensus::default();
        consensus.open(&flight());

        let mut submit = |reporter: &str, status| {
            consensus.submit(&registry, &reporter.into(), &flight(), status, 3)
        };
        assert_eq!(
            submit("r1", StatusCode::OnTime),
            Ok(Response::Recorded {
                status: StatusCode::OnTime,
                tally: 1
            })
        );
        assert_eq!(
            submit("r2", StatusCode::LateAirline),
            Ok(Response::Recorded {
                status: StatusCode::LateAirline,
                tally: 1
            })
        );
        assert_eq!(
            submit("r2", StatusCode::LateAirline),
            Ok(Response::Duplicate {
                status: StatusCode::LateAirline
            })
        );
        assert_eq!(
            submit("r3", StatusCode::LateAirline),
            Ok(Response::Recorded {
                status: StatusCode::LateAirline,
                tally: 2
            })
        );
        assert_eq!(
            submit("r4", StatusCode::LateAirline),
            Ok(Response::Resolved {
                status: StatusCode::LateAirline
            })
        );
        assert_eq!(
            submit("r5", StatusCode::OnTime),
            Err(Error::RequestClosed { flight: flight() })
        );

        let request = consensus.request(&flight()).unwrap();
        assert_eq!(
            request.state(),
            RequestState::Closed {
                status: StatusCode::LateAirline
            }
        );
        assert_eq!(
            request.tallies().collect::<Vec<_>>(),
            vec![(StatusCode::OnTime, 1), (StatusCode::LateAirline, 3)]
        );
        assert_eq!(
            consensus.open(&flight()),
            Opening::AlreadyClosed {
                status: StatusCode::LateAirline
            }
        );
    }

    #[test]
    fn unknown_status_is_not_an_answer() {
        let mut consensus = Consensus::default();
        consensus.open(&flight());
        assert_eq!(
            consensus.submit(&reporters(), &"r1".into(), &flight(), StatusCode::Unknown, 1),
            Err(Error::InvalidStatus {
                status: StatusCode::Unknown
            })
        );
    }

    #[test]
    fn revoked_reporter_loses_recognition() {
        let mut registry = reporters();
        assert!(registry.revoke(&"r1".into()));
        assert!(!registry.revoke(&"r1".into()));
        assert!(!registry.is_recognized(&"r1".into()));
        assert!(registry.admit("r1".into()));
        assert!(!registry.admit("r1".into()));
        assert_eq!(registry.len(), 5);
    }
}
