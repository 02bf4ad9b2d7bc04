use std::{net::SocketAddr, path::PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use surety::{
    Config, Error, LedgerConfig, RestConfig, Surety,
    ledger_message::{Call, Message, NotificationsMessage, Query, Transaction},
    models::{Amount, FlightKey, Principal, StatusCode},
};
use tokio::{
    signal,
    sync::{mpsc, oneshot},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    info!("Starting Surety binary...");
    if let Err(e) = run(args).await {
        error!("Error: {e:?}");
        std::process::exit(1);
    } else {
        info!("Surety has been terminated.");
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.to_config()?;

    let (surety, command_sender) = Surety::new(config)?;
    let (ready_sender, ready_receiver) = oneshot::channel();
    let surety_task = tokio::spawn(async move { surety.run(ready_sender).await });
    ready_receiver.await??;

    let result = match args.command {
        Command::Daemonize => {
            handle_status(&command_sender).await;
            daemonize().await;
            Ok(())
        }
        Command::Status => {
            handle_status(&command_sender).await;
            Ok(())
        }
        Command::Transact { caller, call } => {
            handle_transact(&command_sender, Transaction::new(caller, call.into())).await
        }
        Command::Query { query } => handle_query(&command_sender, query.into()).await,
        Command::Notifications { since } => handle_notifications(&command_sender, since).await,
    };

    // Shutdown Surety.
    command_sender
        .send(surety::Command::Shutdown)
        .await
        .inspect_err(|e| {
            error!("Channel send error: {e}");
        })?;
    info!("Waiting for Surety to terminate...");
    if let Err(e) = surety_task.await {
        error!("Failed to wait until Surety is terminated: {e}");
    }
    result
}

/// A future that resolves when a termination signal is received.
async fn daemonize() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Termination signal received");
}

async fn handle_status(command_sender: &mpsc::Sender<surety::Command>) {
    info!("Handling status command");
    let (reply_sender, reply_receiver) = oneshot::channel();
    if let Err(e) = command_sender
        .send(surety::Command::Status { reply_sender })
        .await
    {
        error!("Channel send error: {e}");
        return;
    }
    let Ok(status) = reply_receiver.await else {
        error!("Failed to receive status reply");
        return;
    };

    println!("============================");
    println!(" Status");
    println!("============================");
    print_json(&status);
}

async fn handle_transact(
    command_sender: &mpsc::Sender<surety::Command>,
    transaction: Transaction,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Executing {transaction:?}");
    let (msg, reply_receiver) = transaction.into();
    send_ledger_message(command_sender, msg).await?;
    let executed = reply_receiver.await??;
    print_json(&executed);
    Ok(())
}

async fn handle_query(
    command_sender: &mpsc::Sender<surety::Command>,
    query: Query,
) -> Result<(), Box<dyn std::error::Error>> {
    let (msg, reply_receiver) = query.into();
    send_ledger_message(command_sender, msg).await?;
    print_json(&reply_receiver.await?);
    Ok(())
}

async fn handle_notifications(
    command_sender: &mpsc::Sender<surety::Command>,
    since: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let (msg, reply_receiver) = NotificationsMessage { since }.into();
    send_ledger_message(command_sender, msg).await?;
    print_json(&reply_receiver.await?);
    Ok(())
}

async fn send_ledger_message(
    command_sender: &mpsc::Sender<surety::Command>,
    msg: Message,
) -> Result<(), Box<dyn std::error::Error>> {
    command_sender
        .send(surety::Command::Ledger(msg))
        .await
        .inspect_err(|e| error!("Channel send error: {e}"))?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to serialize output: {e}"),
    }
}

#[derive(Debug, Parser)]
struct Args {
    /// JSON config file. Command line options override its values.
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long)]
    admin: Option<Principal>,
    #[clap(long)]
    snapshot: Option<PathBuf>,
    #[clap(long)]
    quorum: Option<usize>,
    #[clap(long)]
    rest_addr: Option<SocketAddr>,
    /// Reporter admitted at genesis. May be repeated.
    #[clap(long = "reporter")]
    reporters: Vec<Principal>,
    #[clap(subcommand)]
    command: Command,
}

impl Args {
    fn to_config(&self) -> Result<Config, Error> {
        let mut config = match (&self.config, &self.admin) {
            (Some(path), _) => Config::load(path)?,
            (None, Some(admin)) => Config::new(admin.clone()),
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "either --config or --admin is required".to_string(),
                ));
            }
        };

        if let Some(admin) = &self.admin {
            config.admin = admin.clone();
        }
        if let Some(path) = &self.snapshot {
            config.ledger = LedgerConfig {
                snapshot_path: Some(path.clone()),
                ..config.ledger
            };
        }
        if let Some(quorum) = self.quorum {
            config.rules.quorum = quorum;
        }
        if let Some(addr) = self.rest_addr {
            config.rest = RestConfig { addr };
        }
        config.reporters.extend(self.reporters.iter().cloned());
        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    Daemonize,
    Status,
    /// Submits a transaction on behalf of `--caller`.
    Transact {
        #[clap(long)]
        caller: Principal,
        #[clap(subcommand)]
        call: CallCommand,
    },
    Query {
        #[clap(subcommand)]
        query: QueryCommand,
    },
    Notifications {
        #[clap(long, default_value_t = 0)]
        since: u64,
    },
}

#[derive(Debug, ClapArgs)]
struct FlightArgs {
    #[clap(long)]
    airline: Principal,
    #[clap(long)]
    code: String,
    /// Departure time in unix seconds.
    #[clap(long)]
    departure: u64,
}

impl From<FlightArgs> for FlightKey {
    fn from(args: FlightArgs) -> Self {
        FlightKey::new(args.airline, args.code, args.departure)
    }
}

#[derive(Debug, Subcommand)]
enum CallCommand {
    SetOperationalStatus {
        #[clap(long, action = clap::ArgAction::Set)]
        operational: bool,
    },
    RegisterAirline {
        airline: Principal,
    },
    VoteAirline {
        airline: Principal,
    },
    FundAirline {
        /// Amount in units, e.g. `10` or `0.5`.
        #[clap(long)]
        value: Amount,
    },
    RegisterFlight {
        #[clap(flatten)]
        flight: FlightArgs,
    },
    BuyInsurance {
        #[clap(flatten)]
        flight: FlightArgs,
        #[clap(long)]
        premium: Amount,
    },
    Withdraw,
    RequestFlightStatus {
        #[clap(flatten)]
        flight: FlightArgs,
    },
    SubmitOracleResponse {
        #[clap(flatten)]
        flight: FlightArgs,
        /// Status name (`late-airline`) or code (`20`).
        #[clap(long)]
        status: StatusCode,
    },
    AdmitReporter {
        reporter: Principal,
    },
    RevokeReporter {
        reporter: Principal,
    },
}

impl From<CallCommand> for Call {
    fn from(command: CallCommand) -> Self {
        match command {
            CallCommand::SetOperationalStatus { operational } => {
                Call::SetOperationalStatus { operational }
            }
            CallCommand::RegisterAirline { airline } => Call::RegisterAirline { airline },
            CallCommand::VoteAirline { airline } => Call::VoteAirline { airline },
            CallCommand::FundAirline { value } => Call::FundAirline { value },
            CallCommand::RegisterFlight { flight } => Call::RegisterFlight {
                airline: flight.airline,
                code: flight.code,
                departure: flight.departure,
            },
            CallCommand::BuyInsurance { flight, premium } => Call::BuyInsurance {
                flight: flight.into(),
                premium,
            },
            CallCommand::Withdraw => Call::Withdraw,
            CallCommand::RequestFlightStatus { flight } => Call::RequestFlightStatus {
                flight: flight.into(),
            },
            CallCommand::SubmitOracleResponse { flight, status } => Call::SubmitOracleResponse {
                flight: flight.into(),
                status,
            },
            CallCommand::AdmitReporter { reporter } => Call::AdmitReporter { reporter },
            CallCommand::RevokeReporter { reporter } => Call::RevokeReporter { reporter },
        }
    }
}

#[derive(Debug, Subcommand)]
enum QueryCommand {
    IsOperational,
    AirlinesCount,
    Airline { airline: Principal },
    IsAirlineRegistered { airline: Principal },
    IsAirlineApproved { airline: Principal },
    IsAirlineFunded { airline: Principal },
    IsAirlineRegisteredApprovedAndFunded { airline: Principal },
    IsFlightRegistered {
        #[clap(long)]
        code: String,
        #[clap(long)]
        departure: u64,
    },
    Flight {
        #[clap(flatten)]
        flight: FlightArgs,
    },
    PassengerBalance { passenger: Principal },
    Policy {
        #[clap(flatten)]
        flight: FlightArgs,
        #[clap(long)]
        passenger: Principal,
    },
    StatusRequest {
        #[clap(flatten)]
        flight: FlightArgs,
    },
    Reserves,
    IsReporter { reporter: Principal },
    PaidOut { recipient: Principal },
}

impl From<QueryCommand> for Query {
    fn from(command: QueryCommand) -> Self {
        match command {
            QueryCommand::IsOperational => Query::IsOperational,
            QueryCommand::AirlinesCount => Query::AirlinesCount,
            QueryCommand::Airline { airline } => Query::Airline { airline },
            QueryCommand::IsAirlineRegistered { airline } => Query::IsAirlineRegistered { airline },
            QueryCommand::IsAirlineApproved { airline } => Query::IsAirlineApproved { airline },
            QueryCommand::IsAirlineFunded { airline } => Query::IsAirlineFunded { airline },
            QueryCommand::IsAirlineRegisteredApprovedAndFunded { airline } => {
                Query::IsAirlineRegisteredApprovedAndFunded { airline }
            }
            QueryCommand::IsFlightRegistered { code, departure } => {
                Query::IsFlightRegistered { code, departure }
            }
            QueryCommand::Flight { flight } => Query::Flight {
                flight: flight.into(),
            },
            QueryCommand::PassengerBalance { passenger } => Query::PassengerBalance { passenger },
            QueryCommand::Policy { flight, passenger } => Query::Policy {
                flight: flight.into(),
                passenger,
            },
            QueryCommand::StatusRequest { flight } => Query::StatusRequest {
                flight: flight.into(),
            },
            QueryCommand::Reserves => Query::Reserves,
            QueryCommand::IsReporter { reporter } => Query::IsReporter { reporter },
            QueryCommand::PaidOut { recipient } => Query::PaidOut { recipient },
        }
    }
}
