//! IPC client — one request per connection to the daemon socket.
//!
//! The client resolves the command word, connects, writes the request frame
//! in full, then reads until the daemon closes the connection or the
//! response buffer is full.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

use kvrt_config::{AppConfig, DEFAULT_MESSAGE_BYTES};

use super::codec::{self, DecodeError, EncodeError};
use super::frame;
use super::types::{Body, CommandCode, Request, Response};

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unknown command '{0}' (expected hello, status or shutdown)")]
    UnknownCommand(String),

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to send request: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to read response: {0}")]
    Receive(#[source] std::io::Error),

    #[error("daemon closed the connection without responding")]
    EmptyResponse,

    #[error("invalid response: {0}")]
    InvalidResponse(#[from] DecodeError),

    #[error("failed to build request: {0}")]
    Encode(#[from] EncodeError),

    #[error("invalid response: request does not match (sent {sent}, got {received})")]
    Mismatch {
        sent: CommandCode,
        received: CommandCode,
    },
}

/// Resolve a command word, ignoring case.
pub fn parse_command(word: &str) -> Result<CommandCode, ClientError> {
    CommandCode::from_name(word).ok_or_else(|| ClientError::UnknownCommand(word.to_string()))
}

/// Render a response for the terminal.
pub fn render(response: &Response) -> String {
    if !response.status.is_ok() {
        return match response.body.as_message() {
            Some(message) => format!("response: {} ({message})", response.status),
            None => format!("response: {}", response.status),
        };
    }

    match &response.body {
        Body::Message(message) => format!("response: {message}"),
        Body::Status(status) => format!(
            "response:\n cpu cores:       {}\n memory usage:    {}\n memory capacity: {}",
            status.cpu_cores, status.memory_usage, status.memory_capacity
        ),
    }
}

/// Client for the kvrt daemon socket.
pub struct IpcClient {
    socket_path: PathBuf,
    response_buffer_bytes: usize,
}

impl IpcClient {
    /// Create a new IPC client targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            response_buffer_bytes: DEFAULT_MESSAGE_BYTES,
        }
    }

    /// Create a client from the socket and buffer settings in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.socket_path()).with_response_buffer(config.client.response_buffer_bytes)
    }

    /// Override the size of the buffer the response is collected into.
    pub fn with_response_buffer(mut self, bytes: usize) -> Self {
        self.response_buffer_bytes = bytes.max(1);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Resolve `word` and send it as a request.
    pub async fn run(&self, word: &str) -> Result<Response, ClientError> {
        let command = parse_command(word)?;
        self.request(command).await
    }

    /// Send `command` and return the daemon's response.
    ///
    /// Non-Ok responses are returned as values; only a response that
    /// answers a different command is an error.
    pub async fn request(&self, command: CommandCode) -> Result<Response, ClientError> {
        if !command.is_recognized() {
            return Err(ClientError::UnknownCommand(command.to_string()));
        }
        let request = frame::seal(codec::encode_request(&Request::new(command))?);
        debug!(command = %command, path = %self.socket_path.display(), "IPC request");

        let reply = self.exchange(&request).await?;
        let response = codec::decode_response(frame::payload(&reply))?;
        if response.command != command {
            return Err(ClientError::Mismatch {
                sent: command,
                received: response.command,
            });
        }
        Ok(response)
    }

    /// Write one raw frame and collect the raw reply.
    pub async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        if !self.daemon_available() {
            return Err(ClientError::NotRunning(self.socket_path.clone()));
        }

        let mut stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| ClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        stream.write_all(request).await.map_err(ClientError::Send)?;

        let mut reply = vec![0; self.response_buffer_bytes];
        let mut filled = 0;
        while filled < reply.len() {
            match stream.read(&mut reply[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) => return Err(ClientError::Receive(e)),
            }
        }
        reply.truncate(filled);

        if reply.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        debug!(bytes = reply.len(), "IPC response received");
        Ok(reply)
    }

    // ── Typed API methods ──────────────────────────────────────────────

    /// Liveness check.
    pub async fn hello(&self) -> Result<Response, ClientError> {
        self.request(CommandCode::Hello).await
    }

    /// Host status.
    pub async fn status(&self) -> Result<Response, ClientError> {
        self.request(CommandCode::Status).await
    }

    /// Request daemon shutdown.
    pub async fn shutdown(&self) -> Result<Response, ClientError> {
        self.request(CommandCode::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::types::{StatusBody, StatusCode};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    /// Accept one connection, read the request, reply with `reply` and close.
    async fn one_shot_daemon(path: &Path, reply: &'static [u8]) -> tokio::task::JoinHandle<Vec<u8>> {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0; 256];
            let n = stream.read(&mut request).await.unwrap();
            request.truncate(n);
            stream.write_all(reply).await.unwrap();
            request
        })
    }

    #[test]
    fn test_parse_command_ignores_case() {
        assert_eq!(parse_command("hello").unwrap(), CommandCode::Hello);
        assert_eq!(parse_command("STATUS").unwrap(), CommandCode::Status);
        assert_eq!(parse_command("ShutDown").unwrap(), CommandCode::Shutdown);
    }

    #[test]
    fn test_parse_command_unknown() {
        let err = parse_command("ping").unwrap_err();
        assert!(matches!(err, ClientError::UnknownCommand(ref word) if word == "ping"));
    }

    #[test]
    fn test_render_message() {
        let response = Response::ok(CommandCode::Hello, Body::message("well, hello friend!"));
        assert_eq!(render(&response), "response: well, hello friend!");
    }

    #[test]
    fn test_render_status() {
        let response = Response::ok(
            CommandCode::Status,
            Body::Status(StatusBody {
                cpu_cores: 8,
                memory_usage: 1024,
                memory_capacity: 4096,
            }),
        );
        assert_eq!(
            render(&response),
            "response:\n cpu cores:       8\n memory usage:    1024\n memory capacity: 4096"
        );
    }

    #[test]
    fn test_render_error_status() {
        let response = Response::error(CommandCode::Status, StatusCode::InternalError, "boom");
        assert_eq!(
            render(&response),
            "response: internal server (internal server: boom)"
        );
    }

    #[tokio::test]
    async fn test_missing_socket_is_not_running() {
        let tmp = TempDir::new().unwrap();
        let client = IpcClient::new(tmp.path().join("absent.sock"));
        assert!(!client.daemon_available());

        let err = client.hello().await.unwrap_err();
        assert!(matches!(err, ClientError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_unrecognized_code_is_never_sent() {
        let tmp = TempDir::new().unwrap();
        let client = IpcClient::new(tmp.path().join("absent.sock"));

        let err = client.request(CommandCode::from_wire(7)).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownCommand(ref word) if word == "unknown (7)"));
    }

    #[tokio::test]
    async fn test_unknown_word_fails_before_connecting() {
        let tmp = TempDir::new().unwrap();
        let client = IpcClient::new(tmp.path().join("absent.sock"));

        let err = client.run("ping").await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownCommand(_)));
    }

    #[tokio::test]
    async fn test_request_sends_terminated_frame() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kvrt.sock");
        let daemon = one_shot_daemon(
            &path,
            b"{\"code\":10,\"request_code\":1,\"body\":{\"message\":\"hi\"}}\0",
        )
        .await;

        let response = IpcClient::new(&path).hello().await.unwrap();
        assert_eq!(response.body.as_message(), Some("hi"));
        assert_eq!(daemon.await.unwrap(), b"{\"code\":1}\0");
    }

    #[tokio::test]
    async fn test_mismatched_request_code() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kvrt.sock");
        let _daemon = one_shot_daemon(
            &path,
            b"{\"code\":10,\"request_code\":1,\"body\":{\"message\":\"hi\"}}\0",
        )
        .await;

        let err = IpcClient::new(&path).status().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Mismatch {
                sent: CommandCode::Status,
                received: CommandCode::Hello,
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_reply() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kvrt.sock");
        let _daemon = one_shot_daemon(&path, b"").await;

        let err = IpcClient::new(&path).hello().await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_invalid_response() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kvrt.sock");
        let _daemon = one_shot_daemon(&path, b"not json\0").await;

        let err = IpcClient::new(&path).hello().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }
}
