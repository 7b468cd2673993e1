//! The server side: turning one inbound message into exactly one reply.
//!
//! A [`Server`] owns a [`Dispatch`] implementation (usually a [`Router`]) and handles messages
//! strictly one at a time.  Batch members are dispatched in the order they were received and
//! their responses collected in that same order.  Nothing is spawned, so a slow handler delays
//! everything behind it; run one server per connection if that matters.
//!
//! The reply to a message that produces no responses at all (a notification, or a batch of
//! nothing but notifications) is the empty string.  It is still sent, so transports that pair
//! each request with a reply, like HTTP, always have something to send back.
use serde::Deserialize;

use crate::handler::{BoundArgs, Method, Signature};
use crate::router::{Authoriser, Dispatch, Router};
use crate::transport::Transport;
use crate::{
    BatchResponse, DispatchError, ErrorDetails, HandlerError, Id, JsonRpcError, Reply, Request, Response,
    ResponseError, Result, SingleResponse, WireFormat, codec,
};

mod parser;

pub use parser::{ParsedRequest, RequestParser, validate_request};

/// The code used for "Unauthorised" errors unless configured otherwise.
pub const DEFAULT_UNAUTHORISED_CODE: i32 = 401;

/// Sent if a reply somehow can't be serialized, so the peer still gets an answer.
const FALLBACK_INTERNAL_ERROR: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum nesting of arrays and objects in an inbound message.  Deeper messages are rejected
    /// with a parse error.
    pub max_depth: usize,

    /// Error code sent when the router's [`Authoriser`] rejects a call.
    pub unauthorised_code: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_depth: codec::DEFAULT_REQUEST_DEPTH,
            unauthorised_code: DEFAULT_UNAUTHORISED_CODE,
        }
    }
}

pub struct ServerBuilder<Stage> {
    stage: Stage,
    config: ServerConfig,
}

impl Default for ServerBuilder<Stage1> {
    fn default() -> Self {
        Self {
            stage: Stage1 {
                router: Router::new(),
                methods: Vec::new(),
            },
            config: ServerConfig::default(),
        }
    }
}

impl<Stage> ServerBuilder<Stage> {
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }
}

impl ServerBuilder<Stage1> {
    /// Serve with a custom [`Dispatch`] implementation instead of building a [`Router`].
    pub fn with_dispatch<D: Dispatch>(self, dispatch: D) -> ServerBuilder<Stage2<D>> {
        ServerBuilder {
            stage: Stage2 { dispatch },
            config: self.config,
        }
    }

    /// Start from an existing router.  Methods added to the builder are registered on top of it.
    pub fn with_router(mut self, router: Router) -> Self {
        self.stage.router = router;
        self
    }

    pub fn with_authoriser(mut self, authoriser: impl Authoriser) -> Self {
        self.stage.router = self.stage.router.with_authoriser(authoriser);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.stage.methods.push(method);
        self
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.stage.methods.extend(methods);
        self
    }

    pub fn with_handler<F, Fut, R>(self, alias: impl Into<String>, signature: Signature, handler: F) -> Self
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: serde::Serialize + Send + 'static,
    {
        self.with_method(Method::new(alias, signature, handler))
    }

    /// Register everything and build the server.
    ///
    /// Fails if two methods share an alias.
    pub fn build(self) -> Result<Server<Router>> {
        let Stage1 { mut router, methods } = self.stage;
        router.register_all(methods)?;

        Ok(Server::with_config(router, self.config))
    }
}

impl<D: Dispatch> ServerBuilder<Stage2<D>> {
    pub fn build(self) -> Server<D> {
        Server::with_config(self.stage.dispatch, self.config)
    }
}

#[doc(hidden)]
pub struct Stage1 {
    router: Router,
    methods: Vec<Method>,
}

#[doc(hidden)]
pub struct Stage2<D> {
    dispatch: D,
}

#[derive(Debug)]
pub struct Server<D = Router> {
    dispatch: D,
    parser: RequestParser,
    config: ServerConfig,
}

impl Server {
    pub fn builder() -> ServerBuilder<Stage1> {
        ServerBuilder::default()
    }
}

impl<D: Dispatch> Server<D> {
    pub fn new(dispatch: D) -> Self {
        Self::with_config(dispatch, ServerConfig::default())
    }

    pub fn with_config(dispatch: D, config: ServerConfig) -> Self {
        Self {
            dispatch,
            parser: RequestParser::new(config.max_depth),
            config,
        }
    }

    pub fn dispatch(&self) -> &D {
        &self.dispatch
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Work out the reply to one inbound message, invoking whatever handlers it calls for.
    ///
    /// Returns `None` when the message warrants no response at all.
    pub async fn handle_message(&self, message: &[u8]) -> Option<Reply> {
        let parsed = match self.parser.parse(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(err = %e, "Failed to parse inbound message");
                return Some(ResponseError::new(Id::Null, ErrorDetails::parse_error()).into_reply());
            }
        };

        match parsed {
            ParsedRequest::Invalid => {
                tracing::debug!("Inbound message is not a valid request");
                Some(ResponseError::new(Id::Null, ErrorDetails::invalid_request()).into_reply())
            }
            ParsedRequest::Single(request) => self.handle_request(request).await.map(Reply::Single),
            ParsedRequest::Batch(members) => {
                tracing::debug!(batch_len = members.len(), "Processing batch");

                let mut responses = BatchResponse::new();
                for member in members {
                    match member {
                        Some(request) => {
                            if let Some(response) = self.handle_request(request).await {
                                responses.push(response);
                            }
                        }
                        None => responses.push(ResponseError::new(Id::Null, ErrorDetails::invalid_request())),
                    }
                }

                (!responses.is_empty()).then_some(Reply::Batch(responses))
            }
        }
    }

    /// Like [`Self::handle_message`], but produces the reply body ready to send.
    pub async fn respond(&self, message: &[u8]) -> String {
        let Some(reply) = self.handle_message(message).await else {
            return String::new();
        };

        match reply.to_json_string() {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(err = %e, "Failed to serialize reply");
                FALLBACK_INTERNAL_ERROR.to_string()
            }
        }
    }

    /// Receive one message from the transport and send back its reply.
    ///
    /// Returns `false` without doing anything else if the transport has been closed.
    pub async fn process<T: Transport>(&self, transport: &mut T) -> Result<bool> {
        let Some(message) = transport
            .receive_message()
            .await
            .map_err(JsonRpcError::from_transport)?
        else {
            return Ok(false);
        };

        tracing::trace!(peer = %transport.remote_peer(), %message, "Received message");
        let body = self.respond(message.as_bytes()).await;
        tracing::trace!(reply = %body, "Sending reply");

        transport
            .send_message(body)
            .await
            .map_err(JsonRpcError::from_transport)?;

        Ok(true)
    }

    /// Process messages until the transport is closed or fails.
    pub async fn serve<T: Transport>(&self, mut transport: T) -> Result<()> {
        tracing::debug!(peer = %transport.remote_peer(), "Serving connection");

        while self.process(&mut transport).await? {}

        tracing::debug!(peer = %transport.remote_peer(), "Peer closed connection");
        Ok(())
    }

    /// Dispatch one valid request.  Notifications produce no response, even if they fail.
    async fn handle_request(&self, request: Request) -> Option<SingleResponse> {
        let Request { method, params, id, .. } = request;
        let result = self.dispatch.invoke(&method, params).await;

        let Some(id) = id else {
            if let Err(e) = result {
                tracing::debug!(%method, err = %e, "Notification failed; no response will be sent");
            }
            return None;
        };

        tracing::debug!(request_id = %id, %method, success = result.is_ok(), "Dispatched request");

        Some(match result {
            Ok(result) => Response::new(id, result).into(),
            Err(e) => ResponseError::new(id, self.error_details(e)).into(),
        })
    }

    fn error_details(&self, error: DispatchError) -> ErrorDetails {
        match error {
            DispatchError::MethodNotFound { .. } => ErrorDetails::method_not_found(),
            DispatchError::Unauthorised { .. } => ErrorDetails::unauthorised(self.config.unauthorised_code),
            DispatchError::InvalidParams { method, reason } => {
                tracing::debug!(%method, %reason, "Invalid params");
                ErrorDetails::invalid_params()
            }
            DispatchError::Internal { method, source } => {
                tracing::error!(%method, err = %source, "Method handler failed");
                ErrorDetails::internal_error()
            }
            DispatchError::Application { details, .. } => details,
        }
    }
}

impl ResponseError {
    fn into_reply(self) -> Reply {
        Reply::Single(self.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JsonValue, Params};
    use assert_matches::assert_matches;
    use futures::channel::mpsc;
    use futures::{SinkExt, StreamExt};
    use serde_json::json;

    fn test_server() -> Server {
        Server::builder()
            .with_handler(
                "subtract",
                Signature::new().required("minuend").required("subtrahend"),
                |args: BoundArgs| async move { Ok(args.get::<i64>(0)? - args.get::<i64>(1)?) },
            )
            .with_handler("ab", Signature::new().required("a").optional("b", 2), |args: BoundArgs| async move {
                Ok(json!({"a": args.get::<JsonValue>(0)?, "b": args.get::<JsonValue>(1)?}))
            })
            .with_handler("fail", Signature::new(), |_args: BoundArgs| async move {
                Err::<(), _>(HandlerError::from(anyhow::anyhow!("nope")))
            })
            .with_handler("teapot", Signature::new(), |_args: BoundArgs| async move {
                Err::<(), _>(HandlerError::new(418, "I'm a teapot", json!({"short": true})))
            })
            .with_handler("explode", Signature::new(), |_args: BoundArgs| async move {
                if true {
                    panic!("kaboom");
                }
                Ok(0)
            })
            .build()
            .unwrap()
    }

    async fn respond<D: Dispatch>(server: &Server<D>, message: &str) -> JsonValue {
        let body = server.respond(message.as_bytes()).await;
        serde_json::from_str(&body).unwrap_or_else(|e| panic!("reply {body:?} is not JSON: {e}"))
    }

    #[tokio::test]
    async fn parse_error_has_null_id() {
        let server = test_server();
        for message in ["{", "{]", ""] {
            assert_eq!(
                respond(&server, message).await,
                json!({"jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error"}, "id": null})
            );
        }
    }

    #[tokio::test]
    async fn too_deep_is_a_parse_error() {
        let server = Server::builder()
            .with_config(ServerConfig {
                max_depth: 2,
                ..Default::default()
            })
            .build()
            .unwrap();

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"a","params":[[1]],"id":1}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32700));
        assert_eq!(reply["id"], JsonValue::Null);
    }

    #[tokio::test]
    async fn invalid_request_has_null_id() {
        let server = test_server();
        for message in ["1", "{}", "[]", r#"{"jsonrpc":"2.0","method":1,"params":"bar"}"#] {
            assert_eq!(
                respond(&server, message).await,
                json!({"jsonrpc": "2.0", "error": {"code": -32600, "message": "Invalid Request"}, "id": null})
            );
        }
    }

    #[tokio::test]
    async fn call_and_notification() {
        let server = test_server();

        assert_eq!(
            respond(&server, r#"{"jsonrpc":"2.0","method":"subtract","params":[42,23],"id":1}"#).await,
            json!({"jsonrpc": "2.0", "result": 19, "id": 1})
        );

        // Notifications get an empty reply, even when they fail
        assert_eq!(server.respond(br#"{"jsonrpc":"2.0","method":"subtract","params":[42,23]}"#).await, "");
        assert_eq!(server.respond(br#"{"jsonrpc":"2.0","method":"fail"}"#).await, "");
        assert_eq!(server.respond(br#"{"jsonrpc":"2.0","method":"nope"}"#).await, "");
    }

    #[tokio::test]
    async fn null_id_is_answered() {
        let server = test_server();
        assert_eq!(
            respond(&server, r#"{"jsonrpc":"2.0","method":"subtract","params":[2,1],"id":null}"#).await,
            json!({"jsonrpc": "2.0", "result": 1, "id": null})
        );
    }

    #[tokio::test]
    async fn extreme_numeric_ids_are_echoed_exactly() {
        let server = test_server();
        for id in ["18446744073709551615", "-9223372036854775808"] {
            let request = format!(r#"{{"jsonrpc":"2.0","method":"subtract","params":[2,1],"id":{id}}}"#);
            assert_eq!(
                server.respond(request.as_bytes()).await,
                format!(r#"{{"jsonrpc":"2.0","result":1,"id":{id}}}"#)
            );
        }
    }

    #[tokio::test]
    async fn error_mapping() {
        let server = test_server();

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"nope","id":"x"}"#).await;
        assert_eq!(reply, json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "Method not found"}, "id": "x"}));

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"subtract","params":[1],"id":2}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32602));

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"ab","params":[1,2,3],"id":3}"#).await;
        assert_eq!(reply["error"]["code"], json!(-32602));

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"fail","id":4}"#).await;
        assert_eq!(reply, json!({"jsonrpc": "2.0", "error": {"code": -32603, "message": "Internal error"}, "id": 4}));

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"teapot","id":5}"#).await;
        assert_eq!(
            reply,
            json!({"jsonrpc": "2.0", "error": {"code": 418, "message": "I'm a teapot", "data": {"short": true}}, "id": 5})
        );
    }

    #[tokio::test]
    async fn handler_panics_are_internal_errors() {
        crate::testing::init_test_logging();
        let server = test_server();

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"explode","id":1}"#).await;
        assert_eq!(reply, json!({"jsonrpc": "2.0", "error": {"code": -32603, "message": "Internal error"}, "id": 1}));

        // Swallowed like any other failed notification
        assert_eq!(server.respond(br#"{"jsonrpc":"2.0","method":"explode"}"#).await, "");

        // The rest of a batch is unaffected
        let reply = respond(
            &server,
            r#"[
                {"jsonrpc":"2.0","method":"subtract","params":[5,3],"id":1},
                {"jsonrpc":"2.0","method":"explode","id":2},
                {"jsonrpc":"2.0","method":"explode"},
                {"jsonrpc":"2.0","method":"subtract","params":[3,5],"id":3}
            ]"#,
        )
        .await;
        assert_eq!(
            reply,
            json!([
                {"jsonrpc": "2.0", "result": 2, "id": 1},
                {"jsonrpc": "2.0", "error": {"code": -32603, "message": "Internal error"}, "id": 2},
                {"jsonrpc": "2.0", "result": -2, "id": 3}
            ])
        );
    }

    #[tokio::test]
    async fn named_and_positional_bind_the_same() {
        let server = test_server();
        let expected = json!({"a": 1, "b": 2});

        let named = respond(&server, r#"{"jsonrpc":"2.0","method":"ab","params":{"a":1},"id":1}"#).await;
        let positional = respond(&server, r#"{"jsonrpc":"2.0","method":"ab","params":[1],"id":1}"#).await;
        assert_eq!(named["result"], expected);
        assert_eq!(positional["result"], expected);
    }

    #[tokio::test]
    async fn batch_with_invalid_member_and_notification() {
        let server = test_server();
        let reply = respond(
            &server,
            r#"[
                {"jsonrpc":"2.0","method":"subtract","params":[5,3],"id":"1"},
                {"foo":"boo"},
                {"jsonrpc":"2.0","method":"subtract","params":[5,3]},
                {"jsonrpc":"2.0","method":"nope","id":"2"}
            ]"#,
        )
        .await;

        assert_eq!(
            reply,
            json!([
                {"jsonrpc": "2.0", "result": 2, "id": "1"},
                {"jsonrpc": "2.0", "error": {"code": -32600, "message": "Invalid Request"}, "id": null},
                {"jsonrpc": "2.0", "error": {"code": -32601, "message": "Method not found"}, "id": "2"}
            ])
        );
    }

    #[tokio::test]
    async fn all_notification_batch_gets_empty_reply() {
        let server = test_server();
        let body = server
            .respond(
                br#"[
                    {"jsonrpc":"2.0","method":"subtract","params":[1,1]},
                    {"jsonrpc":"2.0","method":"fail"},
                    {"jsonrpc":"2.0","method":"nope"}
                ]"#,
            )
            .await;
        assert_eq!(body, "");
        assert_matches!(server.handle_message(br#"[{"jsonrpc":"2.0","method":"fail"}]"#).await, None);
    }

    #[tokio::test]
    async fn unauthorised_code_is_configurable() {
        let server = Server::builder()
            .with_authoriser(|_method: &Method| false)
            .with_handler("secret", Signature::new(), |_args: BoundArgs| async move { Ok(42) })
            .with_config(ServerConfig {
                unauthorised_code: -32001,
                ..Default::default()
            })
            .build()
            .unwrap();

        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"secret","id":1}"#).await;
        assert_eq!(
            reply,
            json!({"jsonrpc": "2.0", "error": {"code": -32001, "message": "Unauthorised access"}, "id": 1})
        );

        let default_code = Server::builder()
            .with_authoriser(|_method: &Method| false)
            .with_handler("secret", Signature::new(), |_args: BoundArgs| async move { Ok(42) })
            .build()
            .unwrap();
        let reply = respond(&default_code, r#"{"jsonrpc":"2.0","method":"secret","id":1}"#).await;
        assert_eq!(reply["error"]["code"], json!(401));
    }

    #[test]
    fn duplicate_methods_fail_the_build() {
        let result = Server::builder()
            .with_handler("a", Signature::new(), |_args: BoundArgs| async move { Ok(1) })
            .with_handler("a", Signature::new(), |_args: BoundArgs| async move { Ok(2) })
            .build();

        assert_matches!(result, Err(JsonRpcError::DuplicateMethod { alias }) if alias == "a");
    }

    struct Constant;

    #[async_trait::async_trait]
    impl Dispatch for Constant {
        async fn invoke(&self, method: &str, params: Option<Params>) -> Result<JsonValue, DispatchError> {
            Ok(json!({"method": method, "params": params.map(Params::into_json)}))
        }
    }

    #[tokio::test]
    async fn custom_dispatch() {
        let server = Server::builder().with_dispatch(Constant).build();
        let reply = respond(&server, r#"{"jsonrpc":"2.0","method":"anything","params":[1],"id":1}"#).await;
        assert_eq!(reply["result"], json!({"method": "anything", "params": [1]}));
    }

    #[tokio::test]
    async fn process_replies_once_per_message() {
        crate::testing::init_test_logging();

        let server = test_server();
        let (mut to_server, server_in) = mpsc::channel::<Result<String, std::io::Error>>(4);
        let (server_out, mut from_server) = mpsc::channel::<String>(4);
        let mut transport = (server_in, server_out);

        to_server
            .send(Ok(r#"{"jsonrpc":"2.0","method":"subtract","params":[3,1],"id":9}"#.to_string()))
            .await
            .unwrap();
        to_server
            .send(Ok(r#"{"jsonrpc":"2.0","method":"subtract","params":[3,1]}"#.to_string()))
            .await
            .unwrap();
        drop(to_server);

        assert!(server.process(&mut transport).await.unwrap());
        assert_eq!(
            from_server.next().await.unwrap(),
            r#"{"jsonrpc":"2.0","result":2,"id":9}"#
        );

        assert!(server.process(&mut transport).await.unwrap());
        assert_eq!(from_server.next().await.unwrap(), "");

        assert!(!server.process(&mut transport).await.unwrap());
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let server = test_server();
        let (mut to_server, server_in) = mpsc::channel::<Result<String, std::io::Error>>(1);
        let (server_out, _from_server) = mpsc::channel::<String>(1);

        to_server
            .send(Err(std::io::Error::other("connection reset")))
            .await
            .unwrap();

        // Wrapped once, by the transport, and not again on the way out of the server
        assert_matches!(
            server.serve((server_in, server_out)).await,
            Err(JsonRpcError::Transport { source }) if source.is::<std::io::Error>()
        );
    }

    #[test]
    fn config_from_yaml() {
        let config: ServerConfig = serde_yaml::from_str("unauthorised_code: -32099").unwrap();
        assert_eq!(
            config,
            ServerConfig {
                max_depth: crate::codec::DEFAULT_REQUEST_DEPTH,
                unauthorised_code: -32099,
            }
        );
    }
}
