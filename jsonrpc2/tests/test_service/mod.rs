use std::sync::Arc;
use std::time::Duration;

use futures::lock::Mutex;
use jsonrpc2::{BoundArgs, HandlerError, JsonValue, Method, Server, Signature};
use serde_json::json;

/// State shared by the methods of the test service.  The only thing worth observing from the
/// outside is which notifications have been processed, since notifications never produce a
/// response.
#[derive(Debug, Default)]
pub struct TestState {
    notifications: Vec<String>,
}

pub type SharedState = Arc<Mutex<TestState>>;

/// The methods that make up the "test service".
///
/// These are the methods used in the examples in the JSON-RPC 2.0 specification, plus a few that
/// exercise error handling.  Their behavior matches the expectations in the `testdata/` folder.
pub fn test_service_methods(state: SharedState) -> Vec<Method> {
    vec![
        Method::new(
            "subtract",
            Signature::new().required("minuend").required("subtrahend"),
            |args: BoundArgs| async move { Ok(args.get::<i64>(0)? - args.get::<i64>(1)?) },
        ),
        Method::new(
            "sum",
            Signature::new().optional("a", 0).optional("b", 0).optional("c", 0),
            |args: BoundArgs| async move { Ok(args.get::<i64>(0)? + args.get::<i64>(1)? + args.get::<i64>(2)?) },
        ),
        Method::new("get_data", Signature::new(), |_args: BoundArgs| async move {
            Ok(json!(["hello", 5]))
        }),
        Method::new("echo", Signature::new().required("value"), |args: BoundArgs| async move {
            args.get::<JsonValue>(0)
        }),
        Method::new("fail_with_error", Signature::new(), |_args: BoundArgs| async move {
            Err::<(), _>(HandlerError::new(
                -32000,
                "Something went wrong",
                json!({"details": "It failed on purpose"}),
            ))
        }),
        Method::new("fail_internally", Signature::new(), |_args: BoundArgs| async move {
            Err::<(), HandlerError>(anyhow::anyhow!("the database is on fire").into())
        }),
        Method::new("explode", Signature::new(), |_args: BoundArgs| async move {
            let empty: Vec<i64> = Vec::new();
            Ok(empty[3])
        }),
        Method::new("sleep", Signature::new().required("millis"), |args: BoundArgs| async move {
            let millis: u64 = args.get(0)?;
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(millis)
        }),
        recording_method(
            "update",
            Signature::new()
                .required("a")
                .required("b")
                .required("c")
                .required("d")
                .required("e"),
            &state,
        ),
        recording_method("notify_hello", Signature::new().required("value"), &state),
        recording_method(
            "notify_sum",
            Signature::new().required("a").required("b").required("c"),
            &state,
        ),
        {
            let state = state.clone();
            Method::new("get_notifications", Signature::new(), move |_args: BoundArgs| {
                let state = state.clone();
                async move { Ok(state.lock().await.notifications.clone()) }
            })
        },
    ]
}

/// A method that does nothing but remember that it was invoked.
fn recording_method(alias: &'static str, signature: Signature, state: &SharedState) -> Method {
    let state = state.clone();
    Method::new(alias, signature, move |_args: BoundArgs| {
        let state = state.clone();
        async move {
            state.lock().await.notifications.push(alias.to_string());
            Ok(())
        }
    })
}

pub fn test_service_server() -> Server {
    Server::builder()
        .with_methods(test_service_methods(SharedState::default()))
        .build()
        .unwrap()
}
