use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

#[cfg(feature = "rest")]
use crate::actors::rest;
#[cfg(feature = "rest")]
pub use crate::actors::rest::{Config as RestConfig, Error as RestError};
pub use crate::{
    actors::ledger::{Config as LedgerConfig, Error as LedgerError, message as ledger_message},
    command::{Command, Status},
    config::Config,
};
use crate::{actors::ledger, command::handle_command};

mod actors;
mod command;
pub mod config;
pub mod contract;
pub mod models;

/// The runtime: a ledger actor, optionally served over HTTP, driven through
/// a command channel.
pub struct Surety {
    config: Config,
    command_receiver: mpsc::Receiver<Command>,
}

impl Surety {
    pub fn new(config: Config) -> Result<(Self, mpsc::Sender<Command>), Error> {
        config.validate()?;
        let (command_sender, command_receiver) = mpsc::channel(100);
        Ok((
            Self {
                config,
                command_receiver,
            },
            command_sender,
        ))
    }

    pub async fn run(mut self, ready_sender: oneshot::Sender<Result<(), Error>>) {
        info!("Surety is running...");

        let mut runner = actman::Runner::new();

        let ledger_actor = match ledger::Actor::new(self.config.ledger.clone(), self.config.genesis())
        {
            Ok(actor) => actor,
            Err(e) => {
                error!("Failed to create ledger actor: {e:?}");
                send_ready(ready_sender, Err(e.into()));
                return;
            }
        };
        let ledger_handle = runner.run(ledger_actor);

        #[cfg(feature = "rest")]
        let rest_addr = match rest::Actor::new(&self.config.rest, ledger_handle.clone()).await {
            Ok(actor) => {
                let addr = actor.local_addr();
                runner.run(actor);
                Some(addr)
            }
            Err(e) => {
                error!("Failed to create REST actor: {e:?}");
                runner.shutdown().await;
                send_ready(ready_sender, Err(e.into()));
                return;
            }
        };
        #[cfg(not(feature = "rest"))]
        let rest_addr = None;

        send_ready(ready_sender, Ok(()));

        loop {
            let Some(cmd) = self.command_receiver.recv().await else {
                warn!("Command channel closed.");
                break;
            };
            debug!("Command received: {:?}", cmd);
            if handle_command(cmd, &ledger_handle, rest_addr).await {
                break;
            }
        }

        runner.shutdown().await;
        info!("Surety has been shut down.");
    }
}

fn send_ready(ready_sender: oneshot::Sender<Result<(), Error>>, result: Result<(), Error>) {
    let _ = ready_sender
        .send(result)
        .inspect_err(|_| error!("Failed to send ready signal"));
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::Error),
    #[cfg(feature = "rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] rest::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
