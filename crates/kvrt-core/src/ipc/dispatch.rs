//! Request dispatch: maps a decoded request to the response it earns.

use std::sync::Arc;

use tracing::{debug, error};

use super::codec::DecodeError;
use super::types::{Body, CommandCode, NO_COMMAND, Request, Response, StatusCode};
use crate::metrics::MetricsProvider;

/// Reply text for the hello command.
pub const HELLO_MESSAGE: &str = "well, hello friend!";

/// Reply text for the shutdown command.
pub const SHUTDOWN_MESSAGE: &str = "shutting down...";

/// What the connection does once the response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterWrite {
    /// Close the connection.
    #[default]
    Close,
    /// Close the connection, then ask the daemon to shut down.
    Shutdown,
}

/// A response together with its post-write side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub response: Response,
    pub after_write: AfterWrite,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response,
            after_write: AfterWrite::Close,
        }
    }
}

/// Routes requests to their handlers.
pub struct Dispatcher {
    metrics: Arc<dyn MetricsProvider>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<dyn MetricsProvider>) -> Self {
        Self { metrics }
    }

    /// Produce the response for a well-formed request.
    pub fn dispatch(&self, request: &Request) -> Outcome {
        match request.command {
            CommandCode::Hello => {
                Outcome::reply(Response::ok(CommandCode::Hello, Body::message(HELLO_MESSAGE)))
            }
            CommandCode::Status => Outcome::reply(self.status()),
            CommandCode::Shutdown => Outcome {
                response: Response::ok(CommandCode::Shutdown, Body::message(SHUTDOWN_MESSAGE)),
                after_write: AfterWrite::Shutdown,
            },
            unknown @ CommandCode::Unrecognized(code) => {
                debug!(code, "unrecognized command");
                Outcome::reply(Response::error(
                    unknown,
                    StatusCode::BadRequest,
                    &format!("unrecognized command {code}"),
                ))
            }
        }
    }

    /// Produce the bad-request response for a request that failed to
    /// decode. `request_code` echoes whatever command value the decoder
    /// salvaged, or [`NO_COMMAND`].
    pub fn reject(&self, err: &DecodeError) -> Outcome {
        let echoed = err.echoed_command().unwrap_or(NO_COMMAND);
        debug!(echoed, error = %err, "rejecting malformed request");
        Outcome::reply(Response::error(
            CommandCode::from_wire(echoed),
            StatusCode::BadRequest,
            "bad request",
        ))
    }

    fn status(&self) -> Response {
        match self.metrics.snapshot() {
            Ok(status) => Response::ok(CommandCode::Status, Body::Status(status)),
            Err(err) => {
                error!(error = %err, "metrics provider failed");
                Response::error(
                    CommandCode::Status,
                    StatusCode::InternalError,
                    &format!("status unavailable: {err}"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::codec::decode_request;
    use crate::ipc::types::StatusBody;
    use crate::metrics::MetricsError;
    use pretty_assertions::assert_eq;

    const HOST: StatusBody = StatusBody {
        cpu_cores: 4,
        memory_usage: 512,
        memory_capacity: 2048,
    };

    fn fixed() -> Dispatcher {
        Dispatcher::new(Arc::new(|| -> Result<StatusBody, MetricsError> { Ok(HOST) }))
    }

    fn failing() -> Dispatcher {
        Dispatcher::new(Arc::new(|| -> Result<StatusBody, MetricsError> {
            Err(MetricsError::Memory("meminfo offline".to_string()))
        }))
    }

    #[test]
    fn test_hello() {
        let outcome = fixed().dispatch(&Request::new(CommandCode::Hello));
        assert_eq!(outcome.response.status, StatusCode::Ok);
        assert_eq!(outcome.response.command, CommandCode::Hello);
        assert_eq!(outcome.response.body.as_message(), Some(HELLO_MESSAGE));
        assert_eq!(outcome.after_write, AfterWrite::Close);
    }

    #[test]
    fn test_status_uses_metrics_provider() {
        let outcome = fixed().dispatch(&Request::new(CommandCode::Status));
        assert_eq!(
            outcome.response,
            Response::ok(CommandCode::Status, Body::Status(HOST))
        );
    }

    #[test]
    fn test_status_provider_failure_is_internal_error() {
        let outcome = failing().dispatch(&Request::new(CommandCode::Status));
        assert_eq!(outcome.response.status, StatusCode::InternalError);
        assert_eq!(outcome.response.command, CommandCode::Status);
        let message = outcome.response.body.as_message().unwrap();
        assert!(message.starts_with("internal server: "));
        assert!(message.contains("meminfo offline"));
    }

    #[test]
    fn test_shutdown_schedules_stop() {
        let outcome = fixed().dispatch(&Request::new(CommandCode::Shutdown));
        assert_eq!(outcome.response.status, StatusCode::Ok);
        assert_eq!(outcome.response.body.as_message(), Some(SHUTDOWN_MESSAGE));
        assert_eq!(outcome.after_write, AfterWrite::Shutdown);
    }

    #[test]
    fn test_unrecognized_command_is_bad_request() {
        let outcome = fixed().dispatch(&Request::new(CommandCode::from_wire(999)));
        assert_eq!(outcome.response.status, StatusCode::BadRequest);
        assert_eq!(outcome.response.command.to_wire(), 999);
        assert_eq!(
            outcome.response.body.as_message(),
            Some("bad request: unrecognized command 999")
        );
        assert_eq!(outcome.after_write, AfterWrite::Close);
    }

    #[test]
    fn test_reject_echoes_salvaged_command() {
        let err = decode_request(br#"{"code": 3, "force": true}"#).unwrap_err();
        let outcome = fixed().reject(&err);
        assert_eq!(outcome.response.status, StatusCode::BadRequest);
        assert_eq!(outcome.response.command, CommandCode::Shutdown);
        assert_eq!(
            outcome.response.body.as_message(),
            Some("bad request: bad request")
        );
        // A rejected shutdown request never stops the daemon.
        assert_eq!(outcome.after_write, AfterWrite::Close);
    }

    #[test]
    fn test_reject_without_command_uses_sentinel() {
        let err = decode_request(b"{").unwrap_err();
        let outcome = fixed().reject(&err);
        assert_eq!(outcome.response.command.to_wire(), NO_COMMAND);
    }
}
