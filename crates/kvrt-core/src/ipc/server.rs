//! IPC server — accept loop over a Unix domain socket.
//!
//! Every accepted socket becomes a [`Connection`] task tracked in a
//! [`JoinSet`]. When a [`ShutdownSignal`] arrives the server stops
//! accepting, removes the socket file, and cancels whatever connections are
//! still open before returning.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::connection::{Connection, ConnectionState};
use super::dispatch::Dispatcher;
use crate::daemon::ShutdownSignal;

/// Pause after a failed accept. Errors such as EMFILE leave the listener
/// readable, so retrying at once would spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by every connection of one server.
pub struct IpcState {
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// Size of the single read that makes up a request.
    pub max_message_bytes: usize,
}

/// Connection counts for one [`serve`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeReport {
    /// Connections accepted over the server's lifetime.
    pub accepted: u64,
    /// Connections still open at shutdown and force-closed.
    pub cancelled: usize,
}

/// Bind the control socket, replacing any stale socket file.
///
/// The parent directory is created if missing and the socket is made
/// accessible to its owner only.
pub fn bind_listener(socket_path: &Path) -> io::Result<UnixListener> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    if let Err(err) = std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
    {
        warn!(path = %socket_path.display(), error = %err, "could not restrict socket permissions");
    }
    Ok(listener)
}

/// Serve requests on `socket_path` until a shutdown signal is received.
pub async fn serve(
    socket_path: &Path,
    state: Arc<IpcState>,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) -> io::Result<ServeReport> {
    let listener = bind_listener(socket_path)?;
    info!(path = %socket_path.display(), "IPC server listening");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    let mut report = ServeReport::default();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    report.accepted += 1;
                    let connection = Connection::new(report.accepted, stream, Arc::clone(&state));
                    debug!(conn = connection.id(), "connection accepted");
                    connections.spawn(connection.run(cancel_rx.clone()));
                }
                Err(err) => accept_failed(&err).await,
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                reap(finished);
            }
        }
    }

    drop(listener);
    std::fs::remove_file(socket_path).ok();

    if !connections.is_empty() {
        info!(open = connections.len(), "closing open connections");
        cancel_tx.send_replace(true);
        while let Some(finished) = connections.join_next().await {
            if matches!(&finished, Ok(state) if *state != ConnectionState::Closed) {
                report.cancelled += 1;
            }
            reap(finished);
        }
    }

    info!(
        accepted = report.accepted,
        cancelled = report.cancelled,
        "IPC server stopped"
    );
    Ok(report)
}

async fn accept_failed(err: &io::Error) {
    warn!(
        error = %err,
        backoff_ms = ACCEPT_BACKOFF.as_millis() as u64,
        "accept failed"
    );
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

fn reap(finished: Result<ConnectionState, JoinError>) {
    if let Err(err) = finished {
        error!(error = %err, "connection task failed");
    }
}
