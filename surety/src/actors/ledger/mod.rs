mod config;
pub mod message;

use std::{collections::VecDeque, io, path::Path};

use actman::Control;
pub use config::Config;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    contract::{self, Contract, Notification, Receipt, Vault},
    ledger_message::{
        Answer, Call, Executed, Logged, Message, Outcome, Query, Summary, Transaction,
    },
    models::Principal,
};

/// Owns the contract and applies transactions one at a time.
pub struct Actor {
    config: Config,
    contract: Contract,
    vault: Vault,
    log: VecDeque<Logged>,
    last_sequence: u64,
}

#[async_trait::async_trait]
impl actman::Actor for Actor {
    type Message = Message;

    async fn run(mut self, mut state: actman::State<Self>) {
        loop {
            tokio::select! {
                Some(message) = state.message_receiver.recv() => {
                    self.handle_message(message)
                }
                Some(ctrl) = state.control_receiver.recv() => {
                    match ctrl {
                        Control::Shutdown => {
                            info!("Ledger actor received shutdown control.");
                            return;
                        },
                    }
                }
                else => {
                    warn!("All channels closed, terminating ledger actor.");
                    return;
                }
            }
        }
    }
}

impl Actor {
    /// Restores the snapshot if one exists, otherwise starts from `genesis`.
    pub fn new(config: Config, genesis: Contract) -> Result<Self, Error> {
        let snapshot = match &config.snapshot_path {
            Some(path) if path.exists() => {
                let snapshot = load_snapshot(path)?;
                if snapshot.contract.admin() != genesis.admin() {
                    warn!(
                        "Snapshot at {path:?} is administered by {}, not {}. Keeping the snapshot.",
                        snapshot.contract.admin(),
                        genesis.admin()
                    );
                }
                if snapshot.contract.rules() != genesis.rules() {
                    warn!(
                        "Snapshot at {path:?} has rules {:?}, not the configured {:?}. Keeping the snapshot.",
                        snapshot.contract.rules(),
                        genesis.rules()
                    );
                }
                if snapshot.contract.reporters() != genesis.reporters() {
                    warn!(
                        "Snapshot at {path:?} has reporters {:?}, not the configured {:?}. Keeping the snapshot.",
                        snapshot.contract.reporters(),
                        genesis.reporters()
                    );
                }
                info!("Ledger restored from {path:?}");
                snapshot
            }
            _ => Snapshot {
                contract: genesis,
                vault: Vault::default(),
            },
        };

        if snapshot.contract.reporters().is_empty() {
            warn!("No reporters admitted. Flight statuses cannot be resolved until one is.");
        }

        Ok(Self {
            config,
            contract: snapshot.contract,
            vault: snapshot.vault,
            log: VecDeque::new(),
            last_sequence: 0,
        })
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Execute {
                transaction,
                reply_sender,
            } => self.handle_execute_message(transaction, reply_sender),
            Message::Query {
                query,
                reply_sender,
            } => {
                let _ = reply_sender
                    .send(self.answer(query))
                    .inspect_err(|_| error!("Failed to send reply"));
            }
            Message::Notifications {
                since,
                reply_sender,
            } => {
                let _ = reply_sender
                    .send(self.notifications_since(since))
                    .inspect_err(|_| error!("Failed to send reply"));
            }
            Message::Summary { reply_sender } => {
                let _ = reply_sender
                    .send(self.summary())
                    .inspect_err(|_| error!("Failed to send reply"));
            }
        }
    }

    fn handle_execute_message(
        &mut self,
        transaction: Transaction,
        reply_sender: oneshot::Sender<Result<Executed, Error>>,
    ) {
        let _ = reply_sender
            .send(
                self.handle_execute_message_inner(transaction)
                    .inspect_err(|e| warn!("Transaction rejected: {e}")),
            )
            .inspect_err(|_| error!("Failed to send reply"));
    }

    fn handle_execute_message_inner(
        &mut self,
        Transaction { caller, call }: Transaction,
    ) -> Result<Executed, Error> {
        debug!("Executing {call:?} for {caller}");
        let mut staged_contract = self.contract.clone();
        let mut staged_vault = self.vault.clone();
        let result = execute(&mut staged_contract, &mut staged_vault, &caller, call);
        // A failed transfer still commits: the balance was zeroed before it.
        if let Ok(_) | Err(contract::Error::TransferFailed { .. }) = &result {
            // Nothing takes effect unless the snapshot holding it was written.
            self.save(&staged_contract, &staged_vault)?;
            self.contract = staged_contract;
            self.vault = staged_vault;
        }
        let receipt = result?;
        info!("Transaction committed for {caller}: {:?}", receipt.value);

        let notifications = self.append(receipt.notifications);
        Ok(Executed {
            outcome: receipt.value,
            notifications,
        })
    }

    fn append(&mut self, notifications: Vec<Notification>) -> Vec<Logged> {
        let logged: Vec<_> = notifications
            .into_iter()
            .map(|notification| {
                self.last_sequence += 1;
                Logged {
                    sequence: self.last_sequence,
                    notification,
                }
            })
            .collect();
        self.log.extend(logged.iter().cloned());
        while self.log.len() > self.config.notification_capacity {
            self.log.pop_front();
        }
        logged
    }

    fn notifications_since(&self, since: u64) -> Vec<Logged> {
        self.log
            .iter()
            .filter(|logged| logged.sequence > since)
            .cloned()
            .collect()
    }

    fn summary(&self) -> Summary {
        Summary {
            admin: self.contract.admin().clone(),
            operational: self.contract.is_operational(),
            airlines: self.contract.airlines_count(),
            reporters: self.contract.reporters_count(),
            reserves: self.contract.reserves(),
            last_sequence: self.last_sequence,
        }
    }

    fn answer(&self, query: Query) -> Answer {
        let contract = &self.contract;
        match query {
            Query::IsOperational => Answer::Bool(contract.is_operational()),
            Query::AirlinesCount => Answer::Count(contract.airlines_count()),
            Query::Airline { airline } => Answer::Airline(contract.airline(&airline)),
            Query::IsAirlineRegistered { airline } => {
                Answer::Bool(contract.is_airline_registered(&airline))
            }
            Query::IsAirlineApproved { airline } => {
                Answer::Bool(contract.is_airline_approved(&airline))
            }
            Query::IsAirlineFunded { airline } => {
                Answer::Bool(contract.is_airline_funded(&airline))
            }
            Query::IsAirlineRegisteredApprovedAndFunded { airline } => {
                Answer::Bool(contract.is_airline_registered_approved_and_funded(&airline))
            }
            Query::IsFlightRegistered { code, departure } => {
                Answer::Bool(contract.is_flight_registered(&code, departure))
            }
            Query::Flight { flight } => Answer::Flight(contract.flight(&flight).cloned()),
            Query::PassengerBalance { passenger } => {
                Answer::Amount(contract.passenger_balance(&passenger))
            }
            Query::Policy { flight, passenger } => {
                Answer::Policy(contract.policy(&flight, &passenger).copied())
            }
            Query::StatusRequest { flight } => {
                Answer::StatusRequest(contract.status_request(&flight).cloned())
            }
            Query::Reserves => Answer::Amount(contract.reserves()),
            Query::IsReporter { reporter } => Answer::Bool(contract.is_reporter(&reporter)),
            Query::PaidOut { recipient } => Answer::Amount(self.vault.paid_out(&recipient)),
        }
    }

    fn save(&self, contract: &Contract, vault: &Vault) -> Result<(), Error> {
        match &self.config.snapshot_path {
            Some(path) => save_snapshot(&SnapshotRef { contract, vault }, path),
            None => Ok(()),
        }
    }
}

fn execute(
    contract: &mut Contract,
    vault: &mut Vault,
    caller: &Principal,
    call: Call,
) -> Result<Receipt<Outcome>, contract::Error> {
    Ok(match call {
        Call::SetOperationalStatus { operational } => contract
            .set_operational_status(caller, operational)?
            .map(|()| Outcome::Done),
        Call::RegisterAirline { airline } => contract
            .register_airline(caller, &airline)?
            .map(Outcome::Admission),
        Call::VoteAirline { airline } => contract
            .vote_airline(caller, &airline)?
            .map(Outcome::Ballot),
        Call::FundAirline { value } => contract
            .fund_airline(caller, value)?
            .map(|()| Outcome::Done),
        Call::RegisterFlight {
            airline,
            code,
            departure,
        } => contract
            .register_flight(caller, &airline, &code, departure)?
            .map(Outcome::Flight),
        Call::BuyInsurance { flight, premium } => contract
            .buy_insurance(caller, &flight, premium)?
            .map(Outcome::Policy),
        Call::Withdraw => contract
            .passenger_withdraw(caller, vault)?
            .map(Outcome::Withdrawn),
        Call::RequestFlightStatus { flight } => contract
            .request_flight_status(caller, &flight)?
            .map(Outcome::Opening),
        Call::SubmitOracleResponse { flight, status } => contract
            .submit_oracle_response(caller, &flight, status)?
            .map(Outcome::Response),
        Call::AdmitReporter { reporter } => contract
            .admit_reporter(caller, &reporter)?
            .map(Outcome::Reporters),
        Call::RevokeReporter { reporter } => contract
            .revoke_reporter(caller, &reporter)?
            .map(Outcome::Reporters),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {message}: {cause}")]
    IO { message: String, cause: io::Error },
    #[error("Contract error: {0}")]
    Contract(#[from] contract::Error),
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Snapshot {
    contract: Contract,
    vault: Vault,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    contract: &'a Contract,
    vault: &'a Vault,
}

fn save_snapshot(snapshot: &SnapshotRef<'_>, path: &Path) -> Result<(), Error> {
    let data = serde_json::to_vec_pretty(snapshot)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::IO {
            message: format!("Failed to create directory for snapshot file. parent: {parent:?}"),
            cause: e,
        })?;
    }
    std::fs::write(path, data).map_err(|e| Error::IO {
        message: format!("Failed to write snapshot file at {path:?}"),
        cause: e,
    })?;
    debug!("Snapshot saved to {path:?}");
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<Snapshot, Error> {
    let data = std::fs::read(path).map_err(|e| Error::IO {
        message: format!("Failed to read snapshot file at {path:?}"),
        cause: e,
    })?;
    Ok(serde_json::from_slice(&data)?)
}
