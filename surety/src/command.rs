use std::net::SocketAddr;

use actman::Handle;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::error;

use crate::{
    actors::ledger,
    ledger_message::{Message, Summary},
};

#[derive(Debug)]
pub enum Command {
    Ledger(Message),
    Status {
        reply_sender: oneshot::Sender<Status>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub ledger: Summary,
    pub rest_addr: Option<SocketAddr>,
}

/// Returns true if the runtime should shut down.
pub async fn handle_command(
    command: Command,
    ledger_handle: &Handle<ledger::Actor>,
    rest_addr: Option<SocketAddr>,
) -> bool {
    match command {
        Command::Ledger(msg) => {
            ledger_handle.send(msg).await;
        }
        Command::Status { reply_sender } => {
            handle_status_command(reply_sender, ledger_handle, rest_addr).await;
        }
        Command::Shutdown => {
            return true;
        }
    }

    false
}

async fn handle_status_command(
    reply_sender: oneshot::Sender<Status>,
    ledger_handle: &Handle<ledger::Actor>,
    rest_addr: Option<SocketAddr>,
) {
    let (summary_sender, summary_receiver) = oneshot::channel();
    ledger_handle
        .send(Message::Summary {
            reply_sender: summary_sender,
        })
        .await;

    let Ok(ledger) = summary_receiver.await else {
        error!("Failed to receive ledger summary");

        return;
    };

    let status = Status { ledger, rest_addr };
    let _ = reply_sender
        .send(status)
        .inspect_err(|_| error!("Failed to send status reply"));
}
