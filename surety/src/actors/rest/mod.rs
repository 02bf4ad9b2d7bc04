mod error;

use std::{net::SocketAddr, time::Duration};

use actman::{Control, Handle};
use axum::{
    Json, Router,
    extract::{Query as QueryParams, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::{sync::oneshot, task::JoinHandle};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

use crate::actors::rest::error::ApiError;
pub use crate::actors::rest::error::Error;
use crate::{
    actors::ledger,
    ledger_message::{
        Answer, Executed, Logged, Message, NotificationsMessage, Query, Summary, Transaction,
    },
};

/// Serves the ledger over HTTP until shut down.
pub struct Actor {
    local_addr: SocketAddr,
    server_join_handle: JoinHandle<()>,
    shutdown_sender: oneshot::Sender<()>,
}

#[async_trait::async_trait]
impl actman::Actor for Actor {
    type Message = ();

    async fn run(mut self, mut state: actman::State<Self>) {
        loop {
            tokio::select! {
                Some(()) = state.message_receiver.recv() => {}
                Some(ctrl) = state.control_receiver.recv() => {
                    match ctrl {
                        Control::Shutdown => {
                            info!("REST actor received shutdown control.");
                            break;
                        },
                    }
                }
                else => {
                    warn!("All channels closed, terminating REST actor.");
                    break;
                }
            }
        }

        self.shutdown().await;
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct ServerState {
    ledger_handle: Handle<ledger::Actor>,
}

impl Actor {
    pub async fn new(config: &Config, ledger_handle: Handle<ledger::Actor>) -> Result<Self, Error> {
        let listener = tokio::net::TcpListener::bind(config.addr)
            .await
            .map_err(|cause| Error::IO {
                message: format!("Failed to listen on {}", config.addr),
                cause,
            })?;
        let local_addr = listener.local_addr().map_err(|cause| Error::IO {
            message: "Failed to read the bound address".to_string(),
            cause,
        })?;

        let router = router(ledger_handle);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let server_join_handle = tokio::spawn(async move {
            info!("starting REST server: {local_addr}");
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal(shutdown_receiver))
                .await
            {
                error!("REST server failed: {e}");
            }
        });

        Ok(Self {
            local_addr,
            server_join_handle,
            shutdown_sender,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn shutdown(self) {
        // Send shutdown signal to the axum server
        if self.shutdown_sender.send(()).is_err() {
            warn!("REST server had already stopped");
        }
        // Wait until the axum server task is terminated
        if let Err(e) = self.server_join_handle.await {
            error!("REST server task failed: {e}");
        }
        info!("REST server has been shut down.");
    }
}

fn router(ledger_handle: Handle<ledger::Actor>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/transactions", post(execute))
        .route("/queries", post(query))
        .route("/notifications", get(notifications))
        .layer(
            // Necessary for graceful shutdown
            TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT),
        )
        .with_state(ServerState { ledger_handle })
}

/// A future to be passed to the [`axum::serve::Serve::with_graceful_shutdown`].
/// When this future resolves, the axum server will start graceful shutdown.
async fn shutdown_signal(shutdown_receiver: oneshot::Receiver<()>) {
    // A dropped sender means the actor is gone, so shut down either way.
    let _ = shutdown_receiver.await;
    info!("starting graceful shutdown for REST server...");
}

async fn status(State(state): State<ServerState>) -> Result<Json<Summary>, ApiError> {
    let (reply_sender, reply_receiver) = oneshot::channel();
    state
        .ledger_handle
        .send(Message::Summary { reply_sender })
        .await;
    let summary = reply_receiver.await.map_err(|_| ApiError::Unavailable)?;
    Ok(Json(summary))
}

async fn execute(
    State(state): State<ServerState>,
    Json(transaction): Json<Transaction>,
) -> Result<Json<Executed>, ApiError> {
    let (msg, reply_receiver) = transaction.into();
    state.ledger_handle.send(msg).await;
    let executed = reply_receiver.await.map_err(|_| ApiError::Unavailable)??;
    Ok(Json(executed))
}

async fn query(
    State(state): State<ServerState>,
    Json(query): Json<Query>,
) -> Result<Json<Answer>, ApiError> {
    let (msg, reply_receiver) = query.into();
    state.ledger_handle.send(msg).await;
    let answer = reply_receiver.await.map_err(|_| ApiError::Unavailable)?;
    Ok(Json(answer))
}

async fn notifications(
    State(state): State<ServerState>,
    QueryParams(params): QueryParams<NotificationsMessage>,
) -> Result<Json<Vec<Logged>>, ApiError> {
    let (msg, reply_receiver) = params.into();
    state.ledger_handle.send(msg).await;
    let logged = reply_receiver.await.map_err(|_| ApiError::Unavailable)?;
    Ok(Json(logged))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use actman::Runner;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    use super::*;
    use crate::contract::{Contract, Rules};

    #[test_log::test(tokio::test)]
    async fn status_reports_summary() {
        let (runner, app) = app();
        let (status, body) =
            send(&app, Request::get("/status").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admin"], "admin");
        assert_eq!(body["operational"], true);
        assert_eq!(body["airlines"], 1);
        assert_eq!(body["reserves"], "0");
        runner.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn transactions_and_notifications() {
        let (runner, app) = app();

        let (status, body) = post_json(
            &app,
            "/transactions",
            json!({
                "caller": "admin",
                "call": { "op": "fundAirline", "value": "10" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], json!({ "kind": "done" }));
        assert_eq!(body["notifications"][0]["sequence"], 1);
        assert_eq!(
            body["notifications"][0]["notification"],
            json!({ "type": "airlineFunded", "airline": "admin", "amount": "10" })
        );

        let (status, body) = post_json(
            &app,
            "/queries",
            json!({ "query": "isAirlineFunded", "airline": "admin" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "kind": "bool", "value": true }));

        let (status, body) = send(
            &app,
            Request::get("/notifications?since=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        runner.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn contract_errors_map_to_status_codes() {
        let (runner, app) = app();

        let (status, body) = post_json(
            &app,
            "/transactions",
            json!({
                "caller": "stranger",
                "call": { "op": "registerAirline", "airline": "air-2" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("stranger"));

        let (status, _) = post_json(
            &app,
            "/transactions",
            json!({
                "caller": "admin",
                "call": { "op": "fundAirline", "value": "1" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = post_json(
            &app,
            "/transactions",
            json!({ "caller": "passenger", "call": { "op": "withdraw" } }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(
            &app,
            "/transactions",
            json!({
                "caller": "admin",
                "call": { "op": "setOperationalStatus", "operational": false }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(
            &app,
            "/transactions",
            json!({
                "caller": "admin",
                "call": { "op": "fundAirline", "value": "10" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        runner.shutdown().await;
    }

    #[test_log::test(tokio::test)]
    async fn unavailable_ledger() {
        let (runner, app) = app();
        runner.shutdown().await;
        let (status, _) =
            send(&app, Request::get("/status").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test_log::test(tokio::test)]
    async fn serve_and_shutdown() {
        let mut runner = Runner::new();
        let ledger_handle = runner.run(ledger_actor());
        let actor = Actor::new(&Config::default(), ledger_handle).await.unwrap();
        assert_ne!(actor.local_addr().port(), 0);
        runner.run(actor);
        runner.shutdown().await;
    }

    fn ledger_actor() -> ledger::Actor {
        ledger::Actor::new(
            ledger::Config::default(),
            Contract::new("admin".into(), Rules::default()),
        )
        .unwrap()
    }

    fn app() -> (Runner, Router) {
        let mut runner = Runner::new();
        let ledger_handle = runner.run(ledger_actor());
        (runner, router(ledger_handle))
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        send(
            app,
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}
