use crate::models::{Amount, FlightKey, Principal, StatusCode};

/// Why a call into the contract was rejected. A rejected call leaves the
/// contract untouched, except for [`Error::TransferFailed`] where the
/// passenger balance has already been zeroed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Contract is not operational")]
    NotOperational,
    #[error("Unauthorized caller: {principal}")]
    Unauthorized { principal: Principal },
    #[error("Airline already registered: {airline}")]
    AlreadyRegistered { airline: Principal },
    #[error("Airline is not awaiting approval: {airline}")]
    NotAwaitingApproval { airline: Principal },
    #[error("Airline already funded: {airline}")]
    AlreadyFunded { airline: Principal },
    #[error("Invalid funding amount: expected {expected}, received {received}")]
    InvalidFundingAmount { expected: Amount, received: Amount },
    #[error("Flight already registered: {flight}")]
    FlightAlreadyRegistered { flight: FlightKey },
    #[error("Flight not found: {flight}")]
    FlightNotFound { flight: FlightKey },
    #[error("Flight status already resolved: {flight}")]
    FlightAlreadyResolved { flight: FlightKey },
    #[error("Premium too high: cap {cap}, requested {requested}")]
    PremiumTooHigh { cap: Amount, requested: Amount },
    #[error("Premium must not be zero")]
    InvalidPremium,
    #[error("No balance to withdraw for {passenger}")]
    NoBalance { passenger: Principal },
    #[error("Insufficient reserves: requested {requested}, available {available}")]
    InsufficientReserves { requested: Amount, available: Amount },
    #[error("Transfer of {amount} to {recipient} failed: {reason}")]
    TransferFailed {
        recipient: Principal,
        amount: Amount,
        reason: String,
    },
    #[error("No open status request for {flight}")]
    RequestNotOpen { flight: FlightKey },
    #[error("Status request already closed for {flight}")]
    RequestClosed { flight: FlightKey },
    #[error("Unauthorized reporter: {reporter}")]
    UnauthorizedReporter { reporter: Principal },
    #[error("Not a reportable status: {status:?}")]
    InvalidStatus { status: StatusCode },
    #[error("Amount overflow")]
    Overflow,
}

impl Error {
    pub(crate) fn unauthorized(principal: &Principal) -> Self {
        Self::Unauthorized {
            principal: principal.clone(),
        }
    }
}
