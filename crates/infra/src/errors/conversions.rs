//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use reqwest::StatusCode;
use serde_json::Error as JsonError;
use servertide_domain::ServerTideError;
use std::io::Error as IoError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub ServerTideError);

impl From<InfraError> for ServerTideError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<ServerTideError> for InfraError {
    fn from(value: ServerTideError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoServerTideError {
    fn into_servertide(self) -> ServerTideError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ServerTideError */
/* -------------------------------------------------------------------------- */

impl IntoServerTideError for HttpError {
    fn into_servertide(self) -> ServerTideError {
        if self.is_timeout() {
            return ServerTideError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return ServerTideError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return status_error(status, "");
        }

        if self.is_decode() {
            return ServerTideError::Internal(format!("failed to decode HTTP response: {self}"));
        }

        ServerTideError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_servertide())
    }
}

/// Map a non-success HTTP status (plus any response detail) to a domain error.
pub fn status_error(status: StatusCode, detail: &str) -> ServerTideError {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let mut message = format!("HTTP {code} {reason}");
    if !detail.is_empty() {
        message.push_str(": ");
        message.push_str(detail);
    }

    match code {
        401 | 403 => ServerTideError::Config(format!("{message} (check the API token)")),
        404 => ServerTideError::NotFound(message),
        429 => ServerTideError::Network(message),
        400..=499 => ServerTideError::InvalidInput(message),
        _ => ServerTideError::Network(message),
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → ServerTideError */
/* -------------------------------------------------------------------------- */

impl IntoServerTideError for IoError {
    fn into_servertide(self) -> ServerTideError {
        use std::io::ErrorKind;

        match self.kind() {
            ErrorKind::NotFound => ServerTideError::NotFound(format!("file not found: {self}")),
            ErrorKind::PermissionDenied => {
                ServerTideError::Config(format!("permission denied: {self}"))
            }
            _ => ServerTideError::Internal(format!("I/O error: {self}")),
        }
    }
}

impl From<IoError> for InfraError {
    fn from(value: IoError) -> Self {
        InfraError(value.into_servertide())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → ServerTideError */
/* -------------------------------------------------------------------------- */

impl IntoServerTideError for JsonError {
    fn into_servertide(self) -> ServerTideError {
        ServerTideError::Internal(format!("unexpected JSON payload: {self}"))
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        InfraError(value.into_servertide())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
