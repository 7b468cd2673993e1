//! A Rust implementation of the JSON-RPC 2.0 protocol.
//!
//! The crate covers both directions of the protocol.  The server side turns untrusted bytes into
//! validated requests, routes them to handlers with JSON-RPC's positional and named parameter
//! binding, and collates the results (including batches and notifications) into responses.  The
//! client side issues calls, notifications and batches, and correlates whatever comes back,
//! reporting every protocol-level anomaly as a typed [`ClientError`].
//!
//! How the bytes get from one end to the other is up to you: anything that implements
//! [`Transport`] will do.  Implementations are provided for stream/sink pairs and for anything
//! `AsyncRead + AsyncWrite` framed with newline-delimited messages, plus an in-process
//! [`Loopback`].
//!
//! This library owes a debt to the [`jsonrpsee`](https://github.com/paritytech/jsonrpsee) project,
//! which is a more general-purpose JSON-RPC framework in Rust and is probably what you should use
//! if you need subscriptions or HTTP out of the box.

/// Re-export the exact async-trait macro we use, for compatibility
#[doc(hidden)]
pub use async_trait::async_trait;

/// Used by code generated by the `#[method]` and `#[methods]` macros
#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

mod client;
pub mod codec;
mod error;
mod handler;
mod router;
mod server;
#[cfg(test)]
pub mod testing;
mod transport;
mod types;

pub use client::{BatchBuilder, Client, ClientBuilder, ClientConfig, IdStrategy, ResponseParser};
pub use error::{ClientError, DispatchError, ErrorKind, HandlerError, JsonRpcError, Result};
pub use handler::{BoundArgs, Handler, Method, ParamSpec, ParamsError, Signature};
#[cfg(feature = "macros")]
pub use jsonrpc2_macros::{method, methods};
pub use router::{Authoriser, Dispatch, Router};
pub use server::{
    DEFAULT_UNAUTHORISED_CODE, ParsedRequest, RequestParser, Server, ServerBuilder, ServerConfig,
    validate_request,
};
pub use transport::{Loopback, Transport};
pub use types::{
    BatchRequest, BatchResponse, ErrorCode, ErrorDetails, INTERNAL_ERROR_MSG, INVALID_PARAMS_MSG,
    INVALID_REQUEST_MSG, Id, JsonMap, JsonValue, METHOD_NOT_FOUND_MSG, PARSE_ERROR_MSG, Params, Reply, Request,
    Response, ResponseError, SingleResponse, TwoPointZero, UNAUTHORISED_MSG, WireFormat,
};
