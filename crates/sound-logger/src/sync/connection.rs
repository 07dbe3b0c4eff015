//! Remote connection supervision.
//!
//! Connects with exponential backoff, then monitors the connection with
//! periodic pings. The connected flag gates the sync tasks; connectivity
//! transitions are recorded in the local `Logs.connectivity` table.

use crate::store::LocalStore;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::RemoteStore;

const PROBE_URL: &str = "http://www.google.com";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const MONITOR_INTERVAL: Duration = Duration::from_secs(6);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Watches remote reachability and drives the connected flag.
pub(crate) struct ConnectionHandler {
    remote: Arc<dyn RemoteStore>,
    store: Arc<LocalStore>,
    probe: reqwest::Client,
    connected_tx: watch::Sender<bool>,
}

impl ConnectionHandler {
    /// Creates the handler and the receiver side of the connected flag.
    pub(crate) fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<LocalStore>,
    ) -> (Self, watch::Receiver<bool>) {
        let (connected_tx, connected_rx) = watch::channel(false);
        let probe = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();

        (
            Self {
                remote,
                store,
                probe,
                connected_tx,
            },
            connected_rx,
        )
    }

    /// Runs connect/monitor cycles until cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        loop {
            if self.connect(&cancel).await.is_none() {
                break;
            }

            if self.monitor(&cancel).await.is_none() {
                break;
            }
        }

        let _ = self.connected_tx.send(false);
        info!("Connection handler stopped");
    }

    /// Backoff loop until the remote answers. `None` on cancellation.
    async fn connect(&self, cancel: &CancellationToken) -> Option<()> {
        let mut attempt: u32 = 0;

        loop {
            if self.check_internet().await && self.ping_remote(attempt).await {
                let _ = self.connected_tx.send(true);
                return Some(());
            }

            attempt += 1;
            let backoff = Duration::from_secs(2u64.saturating_pow(attempt.min(16))).min(MAX_BACKOFF);

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// Ping loop while connected. `None` on cancellation.
    async fn monitor(&self, cancel: &CancellationToken) -> Option<()> {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(MONITOR_INTERVAL) => {}
            }

            if self.remote.ping().await.is_err() {
                warn!("Lost connection to remote store, attempting to reconnect");
                let _ = self.connected_tx.send(false);
                self.log_connectivity(
                    "Remote Connection",
                    "Lost",
                    "Remote ping failed, reconnecting.",
                    None,
                )
                .await;
                return Some(());
            }
        }
    }

    /// Plain internet reachability probe.
    async fn check_internet(&self) -> bool {
        match self.probe.get(PROBE_URL).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if ok {
                    self.log_connectivity(
                        "Internet Check",
                        "Success",
                        "Internet connectivity check successful.",
                        Some(json!({ "http_status": response.status().as_u16() })),
                    )
                    .await;
                }
                ok
            }
            Err(e) => {
                self.log_connectivity(
                    "Internet Check",
                    "Exception",
                    "Internet connectivity check failed.",
                    Some(json!({ "exception": e.to_string() })),
                )
                .await;
                false
            }
        }
    }

    async fn ping_remote(&self, attempt: u32) -> bool {
        match self.remote.ping().await {
            Ok(()) => {
                info!("Connected to remote store");
                self.log_connectivity(
                    "Remote Connection",
                    "Connected",
                    "Connected to remote store successfully.",
                    None,
                )
                .await;
                true
            }
            Err(e) => {
                self.log_connectivity(
                    "Remote Connection",
                    "Failure",
                    "Failed to connect or verify remote store.",
                    Some(json!({ "attempt": attempt, "error": e.to_string() })),
                )
                .await;
                false
            }
        }
    }

    async fn log_connectivity(
        &self,
        event_type: &str,
        status: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) {
        if let Err(e) = self
            .store
            .insert_connectivity(event_type, status, message, details.as_ref())
            .await
        {
            error!(error = %e, "Connectivity log insert failed");
        }
    }
}
