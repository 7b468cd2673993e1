//! Validation of inbound requests.
//!
//! Requests come from untrusted peers, so nothing here fails on a malformed request object.  An
//! invalid top-level request becomes [`ParsedRequest::Invalid`] and an invalid batch member becomes
//! a `None` placeholder at its position, which lets the server answer each with an "Invalid
//! Request" error without giving up on the rest of the batch.  Only bytes that aren't JSON at all
//! (or nest too deep) are an `Err`.
use crate::{Id, JsonRpcError, JsonValue, Params, Request, Result, TwoPointZero, codec};

/// What an inbound message turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRequest {
    /// A single valid request or notification.
    Single(Request),
    /// A non-empty batch; `None` marks members that were not valid requests.
    Batch(Vec<Option<Request>>),
    /// Valid JSON, but not a request and not a non-empty array.
    Invalid,
}

#[derive(Debug, Clone)]
pub struct RequestParser {
    max_depth: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(codec::DEFAULT_REQUEST_DEPTH)
    }
}

impl RequestParser {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Decode and validate raw message bytes.
    pub fn parse(&self, bytes: &[u8]) -> Result<ParsedRequest, JsonRpcError> {
        let value = codec::decode(bytes, self.max_depth)?;
        Ok(Self::interpret(value))
    }

    /// Validate an already-decoded message.
    pub fn interpret(value: JsonValue) -> ParsedRequest {
        match value {
            JsonValue::Array(members) if !members.is_empty() => {
                ParsedRequest::Batch(members.into_iter().map(validate_request).collect())
            }
            other => validate_request(other).map_or(ParsedRequest::Invalid, ParsedRequest::Single),
        }
    }
}

/// Validate one request object.
///
/// The checks run in a fixed order and stop at the first failure: it must be an object, `jsonrpc`
/// must be exactly `"2.0"`, `method` must be a non-empty string, `params` (if present) must be an
/// array or object, and `id` (if present) must be null, a number, or a string.  Other keys are
/// ignored.
pub fn validate_request(value: JsonValue) -> Option<Request> {
    let JsonValue::Object(mut object) = value else {
        return None;
    };

    if object.get("jsonrpc").and_then(JsonValue::as_str) != Some("2.0") {
        return None;
    }

    let method = match object.remove("method") {
        Some(JsonValue::String(method)) if !method.is_empty() => method,
        _ => return None,
    };

    let params = match object.remove("params") {
        Some(params) => Some(Params::from_json(params)?),
        None => None,
    };

    // Presence of the key is what matters; `"id": null` is still a call
    let id = match object.remove("id") {
        Some(id) => Some(Id::from_json(&id)?),
        None => None,
    };

    Some(Request {
        jsonrpc: TwoPointZero,
        method,
        params,
        id,
    })
}
