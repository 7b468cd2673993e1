//! In this crate, the concept of a "transport" abstracts away the details of how JSON-RPC messages
//! are sent and received.  A transport is very simply a source of and sink of messages, each one
//! a complete JSON text.
//!
//! The server uses a transport as receive-then-reply: every message received gets exactly one
//! reply, possibly the empty string.  The client uses it the other way around, send-then-receive,
//! and holds a lock across the pair so that replies can't be handed to the wrong caller.
//!
//! You will note that there is no HTTP here.  The framework presumes that you have already
//! established a TCP or stdio or HTTP or whatever connection, and can plug it in via the
//! [`Transport`] interface.
use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt, TryFutureExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{self, Framed};

use crate::router::Dispatch;
use crate::server::Server;
use crate::{JsonRpcError, Result};

/// A transport is a source and sink of JSON-RPC messages, that interfaces with some underlying
/// tranport layer provided by the caller.
///
/// From the transport's perspective the messages are opaque text.
pub trait Transport: Send + Sized + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transport-specific identifier of the remote peer, useful for logging and debugging.
    fn remote_peer(&self) -> Cow<'static, str>;

    /// Send a message to the transport.  Should not complete until the message has been handed off
    /// to the transport layer and transmitted to the remote peer, whatever that means for the
    /// particular transport.
    ///
    /// An empty message is meaningful (it's the reply to a notification) and must be delivered
    /// like any other.
    ///
    /// This does not need to be cancellation-safe because the framework will wait until this
    /// future finishes before considering any message "sent".
    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

    /// Receive a message from the transport.
    ///
    /// The transport can implement a timeout such that the request fails after some time, if that
    /// makes sense.  The framework does not implement any timeout of its own since timeouts are
    /// often transport-dependent.
    ///
    /// This future should be cancellation-safe, such that if the returned future is dropped before
    /// it completes, it will not result in incomplete messages being received or in missed
    /// messages.  A client call that is abandoned part way through relies on this: the reply it
    /// never read is received and discarded by the next call.
    ///
    /// This should return `Ok(None)` if the transport is closed and no more messages can be
    /// received.
    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;
}

/// Internal dyn-compatible wrapper trait around [`Transport`] to erase the types and allow dynamic
/// dispatch.
trait BoxedTransport: Send + 'static {
    fn boxed_send_message(&mut self, message: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
    fn boxed_receive_message(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>>;
}

impl<T> BoxedTransport for T
where
    T: Transport + 'static,
{
    fn boxed_send_message(&mut self, message: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        <Self as Transport>::send_message(self, message)
            .map_err(JsonRpcError::from_transport)
            .boxed()
    }

    fn boxed_receive_message(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        <Self as Transport>::receive_message(self)
            .map_err(JsonRpcError::from_transport)
            .boxed()
    }
}

/// Stream/sink pairs, such as the two halves of a channel, or a `FramedRead` and `FramedWrite`
/// over stdin and stdout.
impl<In, InErr, Out> Transport for (In, Out)
where
    In: Stream<Item = Result<String, InErr>> + Unpin + Send + 'static,
    InErr: std::error::Error + Send + Sync + 'static,
    Out: Sink<String> + Unpin + Send + 'static,
    Out::Error: std::error::Error + Send + Sync + 'static,
{
    type Error = JsonRpcError;

    fn remote_peer(&self) -> Cow<'static, str> {
        format!(
            "({}, {})",
            std::any::type_name::<In>(),
            std::any::type_name::<Out>(),
        )
        .into()
    }

    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
        self.1
            .send(message)
            .map_err(JsonRpcError::from_transport)
    }

    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_ {
        self.0.next().map(|opt_result: Option<Result<_, InErr>>| {
            // Convert this from Option<Result<T>> to Result<Option<T>>
            let result = opt_result.transpose();

            // And wrap the error in a JsonRpcError
            result.map_err(JsonRpcError::from_transport)
        })
    }
}

/// Implementation of [`Transport`] that is generic over any type that implements
/// [`tokio::io::AsyncRead`] and [`tokio::io::AsyncWrite`].
///
/// Reads and writes messages assuming that each message is UTF-8 text separated by newline
/// characters.  The empty reply to a notification is an empty line.
impl<Io> Transport for Framed<Io, codec::LinesCodec>
where
    Io: Send + Unpin + AsyncRead + AsyncWrite + 'static,
{
    type Error = JsonRpcError;

    fn remote_peer(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Io>())
    }

    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
        self.send(message)
            .map_err(JsonRpcError::from_transport)
    }

    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_ {
        self.next()
            .map(|opt_result: Option<Result<_, codec::LinesCodecError>>| {
                opt_result
                    .transpose()
                    .map_err(JsonRpcError::from_transport)
            })
    }
}

/// In-process transport that hands each message straight to a [`Server`].
///
/// Meant for a client talking to a server in the same process, mostly in tests.  Each message
/// sent is processed immediately, and its reply queued up for the next receive.
pub struct Loopback<D> {
    server: Arc<Server<D>>,
    replies: VecDeque<String>,
}

impl<D: Dispatch> Loopback<D> {
    pub fn new(server: Server<D>) -> Self {
        Self::from_shared(Arc::new(server))
    }

    /// Share one server between several loopback transports.
    pub fn from_shared(server: Arc<Server<D>>) -> Self {
        Self {
            server,
            replies: VecDeque::new(),
        }
    }
}

impl<D: Dispatch> Transport for Loopback<D> {
    type Error = std::convert::Infallible;

    fn remote_peer(&self) -> Cow<'static, str> {
        Cow::Borrowed("loopback")
    }

    fn send_message(&mut self, message: String) -> impl Future<Output = Result<(), Self::Error>> + Send + '_ {
        async move {
            let reply = self.server.respond(message.as_bytes()).await;
            self.replies.push_back(reply);
            Ok(())
        }
    }

    fn receive_message(&mut self) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_ {
        futures::future::ready(Ok(self.replies.pop_front()))
    }
}

/// Wrapper around a [`Transport`] implementation which erases the transport type.
///
/// Among other things this provides a `Sync` wrapper around the transport, so exchanging
/// messages doesn't require a `mut` reference.
pub(crate) struct Peer {
    remote_peer: String,
    state: tokio::sync::Mutex<PeerState>,
}

struct PeerState {
    transport: Box<dyn BoxedTransport>,

    /// Replies owed to exchanges that were dropped after sending and before receiving.  They are
    /// still on their way, and have to be read and thrown away before the next reply is ours.
    unread_replies: usize,
}

impl Peer {
    pub(crate) fn new(transport: impl Transport) -> Self {
        // It's not practical to interact with this wrapper from async code unless it is `Sync`.
        // Most of the transport impls, like a stream or a `Write` impl, also require `&mut self`
        // to send or receive so a mutex is needed anyway.
        Self {
            remote_peer: transport.remote_peer().to_string(),
            state: tokio::sync::Mutex::new(PeerState {
                transport: Box::new(transport),
                unread_replies: 0,
            }),
        }
    }

    pub(crate) fn remote_peer(&self) -> &str {
        &self.remote_peer
    }

    /// Send a message and wait for the reply to it.
    ///
    /// The transport stays locked for the whole exchange.  Cancellation-safe: if the returned
    /// future is dropped after the message went out, the reply is discarded by the next exchange
    /// instead of being mistaken for that exchange's reply.
    pub(crate) async fn exchange(&self, message: String) -> Result<String> {
        let mut state = self.state.lock().await;

        while state.unread_replies > 0 {
            let stale = state
                .transport
                .boxed_receive_message()
                .await?
                .ok_or(JsonRpcError::TransportClosed)?;
            state.unread_replies -= 1;
            tracing::debug!(peer = %self.remote_peer, reply = %stale, "Discarding reply to an abandoned request");
        }

        state.transport.boxed_send_message(message).await?;
        state.unread_replies += 1;

        let reply = state
            .transport
            .boxed_receive_message()
            .await?
            .ok_or(JsonRpcError::TransportClosed)?;
        state.unread_replies -= 1;

        Ok(reply)
    }
}
