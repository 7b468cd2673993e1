//! The client side: sending calls, notifications and batches, and correlating whatever comes back.
//!
//! Every operation is a single exchange on the transport: the encoded request goes out, and the
//! next message received is taken to be the reply to it.  The transport is locked for the whole
//! exchange, so a [`Client`] can be cloned and shared between tasks without replies getting
//! crossed, at the cost of only one request being in flight at a time.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::transport::{Peer, Transport};
use crate::{
    BatchRequest, BatchResponse, ClientError, Id, JsonValue, Params, Reply, Request, SingleResponse, codec,
};

mod parser;

pub use parser::ResponseParser;

/// How a client picks the id of each call it makes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdStrategy {
    /// Increasing integers starting at 1, per client.
    #[default]
    Sequential,
    /// A random version 4 UUID, as a string.
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum nesting of arrays and objects accepted in a reply.
    pub max_depth: usize,

    pub id_strategy: IdStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_depth: codec::DEFAULT_RESPONSE_DEPTH,
            id_strategy: IdStrategy::default(),
        }
    }
}

#[derive(Debug)]
struct IdGenerator {
    strategy: IdStrategy,
    next: AtomicU64,
}

impl IdGenerator {
    fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            next: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> Id {
        match self.strategy {
            IdStrategy::Sequential => Id::from(self.next.fetch_add(1, Ordering::Relaxed)),
            IdStrategy::Uuid => Id::from(uuid::Uuid::new_v4().to_string()),
        }
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.config.id_strategy = strategy;
        self
    }

    pub fn bind(self, transport: impl Transport) -> Client {
        Client {
            peer: Arc::new(Peer::new(transport)),
            parser: ResponseParser::new(self.config.max_depth),
            ids: Arc::new(IdGenerator::new(self.config.id_strategy)),
        }
    }
}

/// A JSON-RPC client bound to a transport.
///
/// Clones share the transport and the id sequence.
#[derive(Clone)]
pub struct Client {
    peer: Arc<Peer>,
    parser: ResponseParser,
    ids: Arc<IdGenerator>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Bind a client with the default configuration.
    pub fn new(transport: impl Transport) -> Self {
        Self::builder().bind(transport)
    }

    pub fn remote_peer(&self) -> &str {
        self.peer.remote_peer()
    }

    /// Generate the id for the next call.
    pub fn next_id(&self) -> Id {
        self.ids.next_id()
    }

    /// Call a method and return its result without interpreting it.
    pub async fn call_raw(&self, method: &str, params: Option<Params>) -> Result<JsonValue, ClientError> {
        let id = self.next_id();
        let request = Request::call(id.clone(), method, params);

        tracing::debug!(request_id = %id, method, "Calling method");

        match self.exchange(&request).await? {
            None => Err(ClientError::NoResponse),
            Some(Reply::Batch(_)) => Err(ClientError::UnexpectedResponse {
                expected: "a single response",
                received: "a batch response",
            }),
            Some(Reply::Single(SingleResponse::Success(response))) => {
                if response.id != id {
                    return Err(ClientError::IdMismatch {
                        expected: id,
                        actual: response.id,
                    });
                }

                Ok(response.result)
            }
            Some(Reply::Single(SingleResponse::Error(response))) => {
                if response.id != id {
                    // An error that isn't about our call usually means the server couldn't make
                    // sense of the request at all, and answered with a null id.
                    tracing::warn!(request_id = %id, response_id = %response.id, error = %response.error,
                        "Server rejected the request");
                    return Err(ClientError::MalformedRequest {
                        response_id: response.id,
                        error: response.error,
                    });
                }

                tracing::debug!(request_id = %id, error = %response.error, "Method returned an error");
                Err(ClientError::Server(response.error))
            }
        }
    }

    /// Call a method without params, deserializing the result as `R`.
    pub async fn call<R: DeserializeOwned>(&self, method: &str) -> Result<R, ClientError> {
        let result = self.call_raw(method, None).await?;
        deserialize_result(result)
    }

    /// Call a method with `params`, which must serialize as a JSON array, object, or null (meaning
    /// no params).
    pub async fn call_with_params<P, R>(&self, method: &str, params: P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let result = self.call_raw(method, to_params(params)?).await?;
        deserialize_result(result)
    }

    /// Send a notification.  The server must not reply with anything.
    pub async fn notify_raw(&self, method: &str, params: Option<Params>) -> Result<(), ClientError> {
        tracing::debug!(method, "Sending notification");

        match self.exchange(&Request::notification(method, params)).await? {
            None => Ok(()),
            Some(_) => Err(ClientError::ResponseToNotification),
        }
    }

    pub async fn notify(&self, method: &str) -> Result<(), ClientError> {
        self.notify_raw(method, None).await
    }

    pub async fn notify_with_params<P: Serialize>(&self, method: &str, params: P) -> Result<(), ClientError> {
        self.notify_raw(method, to_params(params)?).await
    }

    /// Send a batch of requests.
    ///
    /// Returns `None` if the server sent nothing back, which is only acceptable when the batch
    /// consists entirely of notifications.  The responses are not correlated with the requests;
    /// use [`BatchResponse::get`] for that.
    pub async fn batch(&self, batch: BatchRequest) -> Result<Option<BatchResponse>, ClientError> {
        if batch.is_empty() {
            return Err(ClientError::EmptyBatch);
        }

        tracing::debug!(requests = batch.len(), "Sending batch");

        match self.exchange(&batch).await? {
            None if batch.is_notification() => Ok(None),
            None => Err(ClientError::NoResponse),
            Some(Reply::Batch(responses)) => Ok(Some(responses)),
            // The server rejected the batch as a whole
            Some(Reply::Single(SingleResponse::Error(response))) if response.id.is_null() => {
                Err(ClientError::Server(response.error))
            }
            Some(Reply::Single(_)) => Err(ClientError::UnexpectedResponse {
                expected: "a batch response",
                received: "a single response",
            }),
        }
    }

    /// Start staging requests for a batch.
    pub fn start_batch(&self) -> BatchBuilder<'_> {
        BatchBuilder {
            client: self,
            requests: BatchRequest::new(),
        }
    }

    async fn exchange<M: Serialize>(&self, message: &M) -> Result<Option<Reply>, ClientError> {
        let text = serde_json::to_string(message).map_err(|source| ClientError::Serialize {
            source,
            type_name: std::any::type_name::<M>(),
        })?;

        let reply = self
            .peer
            .exchange(text)
            .await
            .map_err(|source| ClientError::Transport { source })?;

        self.parser.parse(&reply)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("remote_peer", &self.peer.remote_peer())
            .field("parser", &self.parser)
            .field("id_strategy", &self.ids.strategy)
            .finish()
    }
}

/// Requests staged for a batch, with ids generated by the client.
pub struct BatchBuilder<'a> {
    client: &'a Client,
    requests: BatchRequest,
}

impl BatchBuilder<'_> {
    /// Stage a call, returning the id its response will carry.
    pub fn call(&mut self, method: &str, params: Option<Params>) -> Id {
        let id = self.client.next_id();
        self.requests.push(Request::call(id.clone(), method, params));
        id
    }

    pub fn call_with_params<P: Serialize>(&mut self, method: &str, params: P) -> Result<Id, ClientError> {
        let params = to_params(params)?;
        Ok(self.call(method, params))
    }

    pub fn notify(&mut self, method: &str, params: Option<Params>) {
        self.requests.push(Request::notification(method, params));
    }

    pub fn notify_with_params<P: Serialize>(&mut self, method: &str, params: P) -> Result<(), ClientError> {
        let params = to_params(params)?;
        self.notify(method, params);
        Ok(())
    }

    /// Discard everything staged so far.
    pub fn reset(&mut self) {
        self.requests = BatchRequest::new();
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Send the staged requests.  The builder is empty afterwards, whether or not sending
    /// succeeded, and can be used to stage another batch.
    pub async fn send(&mut self) -> Result<Option<BatchResponse>, ClientError> {
        let requests = std::mem::take(&mut self.requests);
        self.client.batch(requests).await
    }
}

fn to_params<P: Serialize>(params: P) -> Result<Option<Params>, ClientError> {
    let value = serde_json::to_value(params).map_err(|source| ClientError::Serialize {
        source,
        type_name: std::any::type_name::<P>(),
    })?;

    match value {
        JsonValue::Null => Ok(None),
        value => Params::from_json(value)
            .map(Some)
            .ok_or(ClientError::InvalidParams {
                type_name: std::any::type_name::<P>(),
            }),
    }
}

fn deserialize_result<R: DeserializeOwned>(result: JsonValue) -> Result<R, ClientError> {
    serde_json::from_value(result).map_err(|source| ClientError::DeserializeResult {
        source,
        type_name: std::any::type_name::<R>(),
    })
}
