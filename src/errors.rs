use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// All errors that can occur when talking to an Unmanic installation.
#[derive(Error, Debug)]
pub enum UnmanicError {
    /// No HTTP status was obtained: the request timed out or never reached the server.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The server rejected the request payload (HTTP 400).
    #[error("bad request; check your request for any formatting or validation errors")]
    BadRequestValidation,

    /// The requested endpoint does not exist on the server (HTTP 404).
    #[error("bad request; requested endpoint not found")]
    BadRequestEndpointNotFound,

    /// The endpoint exists but not for this HTTP method (HTTP 405).
    #[error("bad request; requested method not allowed")]
    BadRequestMethodNotAllowed,

    /// The server failed while handling the request (HTTP 500).
    #[error("internal server error")]
    InternalServer,

    /// Any other 4xx/5xx response, with whatever the server sent back.
    #[error("API error {status_code} ({content_type}): {body}")]
    Api {
        status_code: u16,
        content_type: String,
        body: ApiErrorBody,
    },

    /// The response did not have the shape the operation expected.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A client method failed; `source` is the underlying failure.
    #[error("{operation} failed: {source}")]
    Operation {
        operation: Operation,
        #[source]
        source: Box<UnmanicError>,
    },

    /// The client was configured with values it cannot use.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UnmanicError {
    /// Tag this error with the client method it surfaced from.
    pub(crate) fn within(self, operation: Operation) -> Self {
        UnmanicError::Operation {
            operation,
            source: Box::new(self),
        }
    }

    /// The innermost error, with any operation wrappers peeled off.
    pub fn root_cause(&self) -> &UnmanicError {
        match self {
            UnmanicError::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The client method this error was raised from, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            UnmanicError::Operation { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    /// `true` if the request ran out of time before the server answered.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root_cause(),
            UnmanicError::Connection(
                ConnectionError::Timeout(_) | ConnectionError::SessionTimeout(_)
            )
        )
    }
}

/// Failures that happen before any HTTP status is available.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The full request/response cycle exceeded the configured timeout.
    #[error("timeout occurred while connecting to API (after {0:?})")]
    Timeout(Duration),

    /// A caller-supplied `reqwest::Client` hit its own timeout first.
    #[error("timeout occurred while connecting to API: {0}")]
    SessionTimeout(#[source] reqwest::Error),

    /// DNS resolution, connection refusal, reset, TLS handshake and friends.
    #[error("error occurred while communicating with API: {0}")]
    Transport(#[source] reqwest::Error),

    /// The configured host, port and path do not form a valid URL.
    #[error("cannot build request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Body of a generic [`UnmanicError::Api`] response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiErrorBody {
    /// Sent with an `application/json` content type and parsed.
    Json(serde_json::Value),
    /// Anything else, kept verbatim.
    Text(String),
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorBody::Json(value) => write!(f, "{value}"),
            ApiErrorBody::Text(text) => f.write_str(text),
        }
    }
}

/// The response arrived but could not be turned into the expected value.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A JSON content type was announced but the body does not parse.
    #[error("malformed JSON response body: {0}")]
    Json(#[source] serde_json::Error),

    /// A JSON object was required but the server sent a non-JSON body.
    #[error("expected a JSON response, got {len} bytes of {content_type:?}")]
    UnexpectedText { content_type: String, len: usize },

    /// The body is JSON, but not an object.
    #[error("expected a JSON object in the response")]
    NotAnObject,

    /// A required key is absent (or `null`) in the response object.
    #[error("response is missing required key `{key}`")]
    MissingKey { key: &'static str },

    /// A value was present but does not fit the model.
    #[error("invalid {model} data: {source}")]
    Invalid {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Names the [`Client`](crate::Client) method an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetVersion,
    GetSettings,
    SetSettings,
    GetWorkersCount,
    SetWorkersCount,
    GetWorkersStatus,
    PauseWorker,
    PauseAllWorkers,
    ResumeWorker,
    ResumeAllWorkers,
    TerminateWorker,
    GetInstallationName,
    TriggerLibraryScan,
    GetPendingTasks,
    GetTaskHistory,
    GetSystemConfiguration,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetVersion => "get_version",
            Operation::GetSettings => "get_settings",
            Operation::SetSettings => "set_settings",
            Operation::GetWorkersCount => "get_workers_count",
            Operation::SetWorkersCount => "set_workers_count",
            Operation::GetWorkersStatus => "get_workers_status",
            Operation::PauseWorker => "pause_worker",
            Operation::PauseAllWorkers => "pause_all_workers",
            Operation::ResumeWorker => "resume_worker",
            Operation::ResumeAllWorkers => "resume_all_workers",
            Operation::TerminateWorker => "terminate_worker",
            Operation::GetInstallationName => "get_installation_name",
            Operation::TriggerLibraryScan => "trigger_library_scan",
            Operation::GetPendingTasks => "get_pending_tasks",
            Operation::GetTaskHistory => "get_task_history",
            Operation::GetSystemConfiguration => "get_system_configuration",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A convenience alias for `Result<T, UnmanicError>`.
pub type Result<T> = std::result::Result<T, UnmanicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_operation_layers() {
        let err = UnmanicError::Connection(ConnectionError::Timeout(Duration::from_secs(8)))
            .within(Operation::GetSettings)
            .within(Operation::GetWorkersCount);

        assert_eq!(err.operation(), Some(Operation::GetWorkersCount));
        assert!(err.is_timeout());
        assert!(matches!(
            err.root_cause(),
            UnmanicError::Connection(ConnectionError::Timeout(_))
        ));
    }

    #[test]
    fn operation_error_names_the_method() {
        let err = UnmanicError::from(DecodeError::MissingKey { key: "version" })
            .within(Operation::GetVersion);
        assert_eq!(
            err.to_string(),
            "get_version failed: response is missing required key `version`"
        );
    }

    #[test]
    fn api_error_displays_text_body() {
        let err = UnmanicError::Api {
            status_code: 501,
            content_type: "text/plain".into(),
            body: ApiErrorBody::Text("nope".into()),
        };
        assert_eq!(err.to_string(), "API error 501 (text/plain): nope");
        assert!(!err.is_timeout());
    }
}
