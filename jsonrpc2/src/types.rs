//! Rust struct definitions for JSON-RPC 2.0 messages.
//!
//! Serialization goes through serde, and every type here writes its fields in the canonical order
//! (`jsonrpc`, then `method`/`result`/`error`, then `params`, then `id`).  Deserialization is a
//! different matter: untrusted requests need to be validated field by field so that a bad batch
//! member can be replaced with a placeholder instead of failing the whole batch, and replies need
//! strict checks with useful error messages.  That's why the inbound direction is handled by the
//! parsers in [`crate::server`] and [`crate::client`] rather than `#[derive(Deserialize)]`.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{JsonRpcError, Result, codec};

/// Re-export the structs and enums that are part of the JSON-RPC protocol
///
/// No need to re-invent this wheel.
pub use jsonrpsee_types::{error::ErrorCode, params::TwoPointZero};
pub use serde_json::Value as JsonValue;

pub type JsonMap = serde_json::Map<String, JsonValue>;

pub const PARSE_ERROR_MSG: &str = "Parse error";
pub const INVALID_REQUEST_MSG: &str = "Invalid Request";
pub const METHOD_NOT_FOUND_MSG: &str = "Method not found";
pub const INVALID_PARAMS_MSG: &str = "Invalid params";
pub const INTERNAL_ERROR_MSG: &str = "Internal error";
pub const UNAUTHORISED_MSG: &str = "Unauthorised access";

/// Request Id
///
/// Numeric ids are held as a [`serde_json::Number`], so they are echoed back exactly as long as
/// they are integers in the range of `i64` or `u64`.  An integer outside that range is read as an
/// `f64` and loses precision, so the id in the response won't match the one that was sent.
/// Peers that need ids that large should use strings.
#[derive(Debug, PartialEq, Clone, Hash, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Null
    Null,
    /// Numeric id, exact within the `i64`/`u64` range
    Number(serde_json::Number),
    /// String id
    Str(String),
}

impl Id {
    /// Interpret a JSON value as an id.  Only null, numbers, and strings are valid.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Number(n) => Some(Self::Number(n.clone())),
            JsonValue::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Parameters of a request: either positional or named.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Params {
    Array(Vec<JsonValue>),
    Object(JsonMap),
}

impl Params {
    /// Interpret a JSON value as request params.  Anything other than an array or an object is
    /// rejected, including `null`.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Array(values) => Some(Self::Array(values)),
            JsonValue::Object(map) => Some(Self::Object(map)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Array(values) => values.len(),
            Self::Object(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Array(values) => JsonValue::Array(values),
            Self::Object(map) => JsonValue::Object(map),
        }
    }
}

impl From<Vec<JsonValue>> for Params {
    fn from(values: Vec<JsonValue>) -> Self {
        Self::Array(values)
    }
}

impl From<JsonMap> for Params {
    fn from(map: JsonMap) -> Self {
        Self::Object(map)
    }
}

/// Anything that can be written to the wire.
pub trait WireFormat: Serialize {
    fn to_json_value(&self) -> Result<JsonValue> {
        serde_json::to_value(self).map_err(|source| JsonRpcError::SerJson {
            source,
            type_name: std::any::type_name::<Self>(),
        })
    }

    fn to_json_string(&self) -> Result<String> {
        codec::encode(self)
    }
}

/// [JSON-RPC request object](https://www.jsonrpc.org/specification#request_object).
///
/// `id: None` is a notification, which is not the same thing as `id: Some(Id::Null)`.  The former
/// has no `id` key at all on the wire, the latter has `"id":null` and expects a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    /// Name of the method to be invoked.
    pub method: String,
    /// Parameter values of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    /// Request ID, absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

impl Request {
    /// A method call, which the server must answer.
    pub fn call(id: impl Into<Id>, method: impl Into<String>, params: impl Into<Option<Params>>) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            method: method.into(),
            params: params.into(),
            id: Some(id.into()),
        }
    }

    /// A notification, which the server never answers.
    pub fn notification(method: impl Into<String>, params: impl Into<Option<Params>>) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            method: method.into(),
            params: params.into(),
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

impl WireFormat for Request {}

/// Successful [JSON-RPC response object](https://www.jsonrpc.org/specification#response_object).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    pub result: JsonValue,
    /// Id of the request this answers
    pub id: Id,
}

impl Response {
    pub fn new(id: Id, result: JsonValue) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            result,
            id,
        }
    }
}

impl WireFormat for Response {}

/// Failed [JSON-RPC response object](https://www.jsonrpc.org/specification#error_object).
///
/// The id is null when the server could not work out which request failed, for example because
/// the request was not valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    /// JSON-RPC version.
    pub jsonrpc: TwoPointZero,
    pub error: ErrorDetails,
    pub id: Id,
}

impl ResponseError {
    pub fn new(id: Id, error: ErrorDetails) -> Self {
        Self {
            jsonrpc: TwoPointZero,
            error,
            id,
        }
    }

    pub fn code(&self) -> i32 {
        self.error.code.code()
    }

    pub fn message(&self) -> &str {
        &self.error.message
    }

    pub fn data(&self) -> Option<&JsonValue> {
        self.error.data.as_ref()
    }
}

impl WireFormat for ResponseError {}

/// [JSON-RPC failed response error details](https://www.jsonrpc.org/specification#error_object).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetails {
    /// Code
    pub code: ErrorCode,
    /// Message
    pub message: String,
    /// Optional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ErrorDetails {
    pub fn new(code: ErrorCode, message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self {
            code,
            message: message.into(),
            data: data.into(),
        }
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError, PARSE_ERROR_MSG, None)
    }
    pub fn invalid_request() -> Self {
        Self::new(ErrorCode::InvalidRequest, INVALID_REQUEST_MSG, None)
    }
    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound, METHOD_NOT_FOUND_MSG, None)
    }
    pub fn invalid_params() -> Self {
        Self::new(ErrorCode::InvalidParams, INVALID_PARAMS_MSG, None)
    }
    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError, INTERNAL_ERROR_MSG, None)
    }
    pub fn unauthorised(code: i32) -> Self {
        Self::new(ErrorCode::from(code), UNAUTHORISED_MSG, None)
    }
    pub fn server_error(code: i32, message: impl Into<String>, data: impl Into<Option<JsonValue>>) -> Self {
        Self::new(ErrorCode::from(code), message, data)
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code.code())
    }
}

impl std::error::Error for ErrorDetails {}

/// One response object, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SingleResponse {
    Success(Response),
    Error(ResponseError),
}

impl SingleResponse {
    pub fn id(&self) -> &Id {
        match self {
            Self::Success(response) => &response.id,
            Self::Error(error) => &error.id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<Response> for SingleResponse {
    fn from(response: Response) -> Self {
        Self::Success(response)
    }
}

impl From<ResponseError> for SingleResponse {
    fn from(error: ResponseError) -> Self {
        Self::Error(error)
    }
}

impl WireFormat for SingleResponse {}

/// A batch of requests, sent as one JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchRequest(Vec<Request>);

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: Request) {
        self.0.push(request);
    }

    /// True if no member of the batch expects a response.
    pub fn is_notification(&self) -> bool {
        self.0.iter().all(Request::is_notification)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Request> {
        self.0.iter()
    }
}

impl From<Vec<Request>> for BatchRequest {
    fn from(requests: Vec<Request>) -> Self {
        Self(requests)
    }
}

impl FromIterator<Request> for BatchRequest {
    fn from_iter<I: IntoIterator<Item = Request>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for BatchRequest {
    type Item = Request;
    type IntoIter = std::vec::IntoIter<Request>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl WireFormat for BatchRequest {}

/// The responses to a batch, in the order the server produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResponse(Vec<SingleResponse>);

impl BatchResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, response: impl Into<SingleResponse>) {
        self.0.push(response.into());
    }

    /// Find the response for a request id.
    ///
    /// Ids are supposed to be unique within a batch, but nothing enforces that; if they are not,
    /// this returns the first match.
    pub fn get(&self, id: &Id) -> Option<&SingleResponse> {
        self.0.iter().find(|response| response.id() == id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SingleResponse> {
        self.0.iter()
    }
}

impl From<Vec<SingleResponse>> for BatchResponse {
    fn from(responses: Vec<SingleResponse>) -> Self {
        Self(responses)
    }
}

impl IntoIterator for BatchResponse {
    type Item = SingleResponse;
    type IntoIter = std::vec::IntoIter<SingleResponse>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl WireFormat for BatchResponse {}

/// A decoded, non-empty reply body: what a server sends back for one inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Single(SingleResponse),
    Batch(BatchResponse),
}

impl From<SingleResponse> for Reply {
    fn from(response: SingleResponse) -> Self {
        Self::Single(response)
    }
}

impl From<BatchResponse> for Reply {
    fn from(batch: BatchResponse) -> Self {
        Self::Batch(batch)
    }
}

impl WireFormat for Reply {}
