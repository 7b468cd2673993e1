use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types::{ErrorCode, ErrorDetails, Id};

pub type Result<T, E = JsonRpcError> = std::result::Result<T, E>;

/// Errors from the codec, the transports, and server setup.
#[derive(Debug, Error)]
pub enum JsonRpcError {
    #[error("Malformed JSON")]
    ParseJson {
        source: serde_json::Error,
        json: String,
    },

    #[error("JSON nesting exceeds the maximum depth of {limit}")]
    DepthLimitExceeded { limit: usize },

    #[error("Error serializing {type_name} to JSON")]
    SerJson {
        source: serde_json::Error,
        type_name: &'static str,
    },

    #[error("Transport error")]
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("The transport was closed before a reply was received")]
    TransportClosed,

    #[error("Duplicate alias exists for {alias}")]
    DuplicateMethod { alias: String },
}

impl JsonRpcError {
    /// True if this is one of the failures that the JSON-RPC spec calls a parse error: the bytes
    /// were not valid JSON, or they nested deeper than allowed.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::ParseJson { .. } | Self::DepthLimitExceeded { .. })
    }

    /// Wrap an error raised by a transport.  Errors that are already a [`JsonRpcError`] pass
    /// through as they are, so layered transports don't nest `Transport` inside `Transport`.
    pub(crate) fn from_transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let error: Box<dyn std::error::Error + Send + Sync + 'static> = Box::new(error);
        match error.downcast::<JsonRpcError>() {
            Ok(error) => *error,
            Err(source) => Self::Transport { source },
        }
    }
}

/// Get whatever message can be recovered from the payload of a caught panic.
pub(crate) fn panic_err_to_string(err: Box<dyn std::any::Any + Send + 'static>) -> String {
    match err.downcast::<String>() {
        Ok(message) => *message,
        Err(err) => match err.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "<panic payload is not a string>".to_string(),
        },
    }
}

/// Failure reported by a method handler.
///
/// Handlers that want a specific error object to reach the caller return
/// [`HandlerError::Response`]; it is passed through to the wire unchanged.  Anything else a
/// handler fails with becomes an internal error, and the details stay in the server's logs.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{}", .0.message)]
    Response(ErrorDetails),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Fail with an application-defined error object.
    pub fn new(code: i32, message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::Response(ErrorDetails::new(ErrorCode::from(code), message, data))
    }

    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams(reason.into())
    }
}

impl From<ErrorDetails> for HandlerError {
    fn from(details: ErrorDetails) -> Self {
        Self::Response(details)
    }
}

/// Why a method could not be dispatched, or how its handler failed.
///
/// The server maps each of these to exactly one JSON-RPC error object.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Method '{method}' not found")]
    MethodNotFound { method: String },

    #[error("Not authorised to invoke '{method}'")]
    Unauthorised { method: String },

    #[error("Invalid params for '{method}': {reason}")]
    InvalidParams { method: String, reason: String },

    #[error("Method '{method}' failed")]
    Internal {
        method: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Method '{method}' returned error {}: {}", .details.code.code(), .details.message)]
    Application { method: String, details: ErrorDetails },
}

impl DispatchError {
    pub(crate) fn from_handler_error(method: &str, error: HandlerError) -> Self {
        match error {
            HandlerError::Response(details) => Self::Application {
                method: method.to_string(),
                details,
            },
            HandlerError::InvalidParams(reason) => Self::InvalidParams {
                method: method.to_string(),
                reason,
            },
            HandlerError::Internal(e) => Self::Internal {
                method: method.to_string(),
                source: e.into(),
            },
        }
    }
}

/// The three broad classes of client failure.
///
/// Callers usually only care whether the server reported an application error ([`Self::Server`])
/// or something went wrong getting there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The transport failed to carry the request or the reply.
    Transport,
    /// The reply did not have the shape JSON-RPC requires, or did not match the request.
    Protocol,
    /// The server processed the request and answered with an error object.
    Server,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport failure while talking to the server")]
    Transport { source: JsonRpcError },

    #[error("Failed to parse response from server")]
    ParseResponse { source: JsonRpcError },

    #[error("The response received from the server was invalid: {reason}")]
    InvalidResponse { reason: String },

    #[error("The server sent no response")]
    NoResponse,

    #[error("Expected {expected} from the server but received {received}")]
    UnexpectedResponse {
        expected: &'static str,
        received: &'static str,
    },

    #[error("The server replied to a notification")]
    ResponseToNotification,

    #[error("The request was malformed, or the server replied erroneously")]
    MalformedRequest {
        response_id: Id,
        #[source]
        error: ErrorDetails,
    },

    #[error("The request and response IDs do not match (sent {expected}, received {actual})")]
    IdMismatch { expected: Id, actual: Id },

    #[error("Refusing to send an empty batch")]
    EmptyBatch,

    #[error("Params of type {type_name} must serialize to a JSON array or object")]
    InvalidParams { type_name: &'static str },

    #[error("Error serializing {type_name} to JSON")]
    Serialize {
        source: serde_json::Error,
        type_name: &'static str,
    },

    #[error("Error deserializing the result as {type_name}")]
    DeserializeResult {
        source: serde_json::Error,
        type_name: &'static str,
    },

    #[error("Server returned error {}: {}", .0.code.code(), .0.message)]
    Server(ErrorDetails),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Server(_) => ErrorKind::Server,
            _ => ErrorKind::Protocol,
        }
    }

    /// The error object the server answered with, if this is a server error.
    pub fn server_error(&self) -> Option<&ErrorDetails> {
        match self {
            Self::Server(details) => Some(details),
            _ => None,
        }
    }
}
