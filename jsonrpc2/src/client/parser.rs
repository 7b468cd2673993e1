//! Strict validation of replies from a server.
//!
//! Unlike the request side, nothing here is forgiving.  A server is expected to produce
//! well-formed responses, so anything else is reported as an error describing what was wrong.
use crate::{
    BatchResponse, ClientError, ErrorCode, ErrorDetails, Id, JsonValue, Reply, Response, ResponseError,
    SingleResponse, codec,
};

#[derive(Debug, Clone)]
pub struct ResponseParser {
    max_depth: usize,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(codec::DEFAULT_RESPONSE_DEPTH)
    }
}

impl ResponseParser {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Parse a reply body.  An empty body means the server sent no response.
    pub fn parse(&self, body: &str) -> Result<Option<Reply>, ClientError> {
        if body.is_empty() {
            return Ok(None);
        }

        let value = codec::decode(body.as_bytes(), self.max_depth)
            .map_err(|source| ClientError::ParseResponse { source })?;

        let reply = match value {
            JsonValue::Array(members) if !members.is_empty() => Reply::Batch(BatchResponse::from(
                members
                    .into_iter()
                    .map(parse_single)
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            other => Reply::Single(parse_single(other)?),
        };

        Ok(Some(reply))
    }
}

fn invalid(reason: impl Into<String>) -> ClientError {
    ClientError::InvalidResponse { reason: reason.into() }
}

fn parse_single(value: JsonValue) -> Result<SingleResponse, ClientError> {
    let JsonValue::Object(mut object) = value else {
        return Err(invalid("response is not a JSON object"));
    };

    if object.get("jsonrpc").and_then(JsonValue::as_str) != Some("2.0") {
        return Err(invalid("missing or unsupported `jsonrpc` version"));
    }

    let id = match object.remove("id") {
        Some(id) => Id::from_json(&id).ok_or_else(|| invalid("`id` must be a string, number, or null"))?,
        None => return Err(invalid("missing `id`")),
    };

    match (object.remove("result"), object.remove("error")) {
        (Some(result), None) => Ok(Response::new(id, result).into()),
        (None, Some(error)) => Ok(ResponseError::new(id, parse_error_object(error)?).into()),
        (Some(_), Some(_)) => Err(invalid("response has both `result` and `error`")),
        (None, None) => Err(invalid("response has neither `result` nor `error`")),
    }
}

fn parse_error_object(value: JsonValue) -> Result<ErrorDetails, ClientError> {
    let JsonValue::Object(mut object) = value else {
        return Err(invalid("`error` is not a JSON object"));
    };

    let code = object
        .get("code")
        .and_then(JsonValue::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .ok_or_else(|| invalid("`error.code` is missing or not a 32-bit integer"))?;

    let message = match object.remove("message") {
        Some(JsonValue::String(message)) => message,
        _ => return Err(invalid("`error.message` is missing or not a string")),
    };

    Ok(ErrorDetails::new(ErrorCode::from(code), message, object.remove("data")))
}
