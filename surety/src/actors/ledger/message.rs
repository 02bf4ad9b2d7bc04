use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::{
    actors::ledger::Error,
    contract::{
        Admission, AirlineStatus, Ballot, Flight, Notification, Opening, Policy, Response,
        StatusRequest,
    },
    models::{Amount, FlightKey, Principal, StatusCode},
};

pub enum Message {
    Execute {
        transaction: Transaction,
        reply_sender: oneshot::Sender<Result<Executed, Error>>,
    },
    Query {
        query: Query,
        reply_sender: oneshot::Sender<Answer>,
    },
    Notifications {
        since: u64,
        reply_sender: oneshot::Sender<Vec<Logged>>,
    },
    Summary {
        reply_sender: oneshot::Sender<Summary>,
    },
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute { transaction, .. } => {
                f.debug_tuple("Execute").field(transaction).finish()
            }
            Self::Query { query, .. } => f.debug_tuple("Query").field(query).finish(),
            Self::Notifications { since, .. } => {
                f.debug_tuple("Notifications").field(since).finish()
            }
            Self::Summary { .. } => f.debug_tuple("Summary").finish(),
        }
    }
}

/// A state-changing call made by `caller`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub caller: Principal,
    pub call: Call,
}

impl Transaction {
    pub fn new(caller: impl Into<Principal>, call: Call) -> Self {
        Self {
            caller: caller.into(),
            call,
        }
    }
}

impl From<Transaction> for (Message, oneshot::Receiver<Result<Executed, Error>>) {
    fn from(transaction: Transaction) -> Self {
        let (reply_sender, reply_receiver) = oneshot::channel();
        (
            Message::Execute {
                transaction,
                reply_sender,
            },
            reply_receiver,
        )
    }
}

/// Currency amounts are what the caller attaches to the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Call {
    SetOperationalStatus {
        operational: bool,
    },
    RegisterAirline {
        airline: Principal,
    },
    VoteAirline {
        airline: Principal,
    },
    FundAirline {
        value: Amount,
    },
    RegisterFlight {
        airline: Principal,
        code: String,
        departure: u64,
    },
    BuyInsurance {
        flight: FlightKey,
        premium: Amount,
    },
    Withdraw,
    RequestFlightStatus {
        flight: FlightKey,
    },
    SubmitOracleResponse {
        flight: FlightKey,
        status: StatusCode,
    },
    AdmitReporter {
        reporter: Principal,
    },
    RevokeReporter {
        reporter: Principal,
    },
}

/// What a committed transaction returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Outcome {
    Done,
    Admission(Admission),
    Ballot(Ballot),
    Flight(FlightKey),
    Policy(Policy),
    Withdrawn(Amount),
    Opening(Opening),
    Response(Response),
    /// Whether the reporter allowlist changed.
    Reporters(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Executed {
    pub outcome: Outcome,
    pub notifications: Vec<Logged>,
}

/// A notification with its position in the ledger's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logged {
    pub sequence: u64,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Query {
    IsOperational,
    AirlinesCount,
    Airline { airline: Principal },
    IsAirlineRegistered { airline: Principal },
    IsAirlineApproved { airline: Principal },
    IsAirlineFunded { airline: Principal },
    IsAirlineRegisteredApprovedAndFunded { airline: Principal },
    IsFlightRegistered { code: String, departure: u64 },
    Flight { flight: FlightKey },
    PassengerBalance { passenger: Principal },
    Policy { flight: FlightKey, passenger: Principal },
    StatusRequest { flight: FlightKey },
    Reserves,
    IsReporter { reporter: Principal },
    PaidOut { recipient: Principal },
}

impl From<Query> for (Message, oneshot::Receiver<Answer>) {
    fn from(query: Query) -> Self {
        let (reply_sender, reply_receiver) = oneshot::channel();
        (
            Message::Query {
                query,
                reply_sender,
            },
            reply_receiver,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Answer {
    Bool(bool),
    Count(usize),
    Amount(Amount),
    Airline(Option<AirlineStatus>),
    Flight(Option<Flight>),
    Policy(Option<Policy>),
    StatusRequest(Option<StatusRequest>),
}

/// Notifications logged after `since`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsMessage {
    pub since: u64,
}

impl From<NotificationsMessage> for (Message, oneshot::Receiver<Vec<Logged>>) {
    fn from(NotificationsMessage { since }: NotificationsMessage) -> Self {
        let (reply_sender, reply_receiver) = oneshot::channel();
        (
            Message::Notifications {
                since,
                reply_sender,
            },
            reply_receiver,
        )
    }
}

/// Headline figures of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub admin: Principal,
    pub operational: bool,
    pub airlines: usize,
    pub reporters: usize,
    pub reserves: Amount,
    /// Sequence number of the latest notification, 0 if none.
    pub last_sequence: u64,
}
