//! Throwaway daemon for integration tests.
//!
//! [`TestServer`] binds a socket inside its own temp directory and serves
//! on a spawned task. The temp directory is deleted when the value is
//! dropped, guaranteeing cleanup even on panic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kvrt_config::AppConfig;
use kvrt_core::ipc::{Dispatcher, IpcClient, IpcState, ServeReport, serve};
use kvrt_core::{MetricsProvider, ShutdownSignal};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::TestConfigBuilder;
use crate::metrics::FixedMetrics;

const STARTUP_POLL: Duration = Duration::from_millis(10);
const STARTUP_ATTEMPTS: usize = 500;

/// A running IPC server with an owned temp directory.
pub struct TestServer {
    config: AppConfig,
    socket_path: PathBuf,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    handle: JoinHandle<std::io::Result<ServeReport>>,
    _temp_dir: TempDir,
}

impl TestServer {
    /// Start a server reporting [`FixedMetrics`].
    pub async fn start() -> Self {
        Self::start_with_metrics(Arc::new(FixedMetrics::default())).await
    }

    /// Start a server backed by the given metrics provider.
    pub async fn start_with_metrics(metrics: Arc<dyn MetricsProvider>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = TestConfigBuilder::new()
            .socket_path(temp_dir.path().join("kvrt.sock"))
            .build();
        Self::start_with(config, metrics, temp_dir).await
    }

    /// Start a server using `config`; its socket path should live in
    /// `temp_dir`.
    pub async fn start_with(
        config: AppConfig,
        metrics: Arc<dyn MetricsProvider>,
        temp_dir: TempDir,
    ) -> Self {
        let socket_path = config.socket_path();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let state = Arc::new(IpcState {
            dispatcher: Arc::new(Dispatcher::new(metrics)),
            shutdown_tx: shutdown_tx.clone(),
            max_message_bytes: config.daemon.max_message_bytes,
        });

        let serve_path = socket_path.clone();
        let handle = tokio::spawn(async move { serve(&serve_path, state, shutdown_rx).await });

        wait_for_socket(&socket_path).await;
        Self {
            config,
            socket_path,
            shutdown_tx,
            handle,
            _temp_dir: temp_dir,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// A client pointed at this server.
    pub fn client(&self) -> IpcClient {
        IpcClient::from_config(&self.config)
    }

    /// Whether the serve task has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the server to stop and wait for it.
    pub async fn shutdown_and_wait(self) -> ServeReport {
        let _ = self.shutdown_tx.send(ShutdownSignal);
        self.wait().await
    }

    /// Wait for the server to stop on its own, e.g. after a shutdown
    /// command.
    pub async fn wait(self) -> ServeReport {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server failed")
    }
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..STARTUP_ATTEMPTS {
        if path.exists() {
            return;
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
    panic!("socket {} never appeared", path.display());
}
