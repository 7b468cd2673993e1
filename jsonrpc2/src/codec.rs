//! Encoding and decoding of JSON text, with a bound on how deeply the decoded value may nest.
//!
//! JSON-RPC endpoints decode bytes from whoever is on the other end of the transport, so the
//! nesting depth is checked before `serde_json` ever sees the input.  Exceeding the bound is
//! reported as a parse error, same as malformed JSON.
use serde::Serialize;

use crate::{JsonRpcError, JsonValue, Result};

/// Default maximum nesting of an inbound request.
pub const DEFAULT_REQUEST_DEPTH: usize = 24;

/// Default maximum nesting of a reply received by a client.
///
/// `serde_json` refuses to go deeper than 128 levels regardless, so there is no point in allowing
/// more than that.
pub const DEFAULT_RESPONSE_DEPTH: usize = 128;

/// Decode JSON text, failing if it nests more than `max_depth` arrays or objects deep.
///
/// Scalars have depth 0, `[1]` and `{"a":1}` have depth 1, `[[1]]` has depth 2.
pub fn decode(bytes: &[u8], max_depth: usize) -> Result<JsonValue> {
    check_depth(bytes, max_depth)?;

    serde_json::from_slice(bytes).map_err(|source| JsonRpcError::ParseJson {
        source,
        json: String::from_utf8_lossy(bytes).into_owned(),
    })
}

/// Encode a value as compact JSON text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|source| JsonRpcError::SerJson {
        source,
        type_name: std::any::type_name::<T>(),
    })
}

/// Scan the raw text for container nesting without building anything.
///
/// This does not validate the JSON; brackets that don't balance are left for the real decoder to
/// complain about.
fn check_depth(bytes: &[u8], limit: usize) -> Result<()> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in bytes {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return Err(JsonRpcError::DepthLimitExceeded { limit });
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    Ok(())
}
