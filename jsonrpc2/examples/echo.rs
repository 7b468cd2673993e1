//! Very simple example in which the JSON-RPC server has a method `echo`, which returns in a
//! response whatever `value` the client sent it, and a method `subtract`.
use jsonrpc2::{BoundArgs, Client, JsonValue, Server, Signature};
use serde_json::json;
use tokio::io::duplex;
use tokio_util::codec::{Framed, LinesCodec};

#[tokio::main]
async fn main() {
    // Create a pair of connected pipes that will serve as the transport between client and server
    let (client, server) = duplex(1024);

    // Create framed transports with a reasonable max size to avoid DoS vulns
    let client_transport = Framed::new(client, LinesCodec::new_with_max_length(1024 * 1024));
    let server_transport = Framed::new(server, LinesCodec::new_with_max_length(1024 * 1024));

    let server = Server::builder()
        .with_handler("echo", Signature::new().required("value"), |args: BoundArgs| async move {
            args.get::<JsonValue>(0)
        })
        .with_handler(
            "subtract",
            Signature::new().required("minuend").optional("subtrahend", 1),
            |args: BoundArgs| async move { Ok(args.get::<i64>(0)? - args.get::<i64>(1)?) },
        )
        .build()
        .unwrap();

    let server_task = tokio::spawn(async move { server.serve(server_transport).await });

    let client = Client::new(client_transport);

    for request in [json!("Hello, world!"), json!({ "foo": "bar" }), json!([1, 2, 3])] {
        let response: JsonValue = client.call_with_params("echo", [request.clone()]).await.unwrap();
        assert_eq!(response, request);
    }

    let difference: i64 = client
        .call_with_params("subtract", json!({ "minuend": 42 }))
        .await
        .unwrap();
    assert_eq!(difference, 41);

    // Nothing comes back from a notification, not even an error
    client.notify("no_such_method").await.unwrap();

    let mut batch = client.start_batch();
    let first = batch.call_with_params("echo", ["first"]).unwrap();
    let second = batch.call_with_params("subtract", [10, 3]).unwrap();
    let responses = batch.send().await.unwrap().unwrap();
    println!("{first} -> {:?}", responses.get(&first));
    println!("{second} -> {:?}", responses.get(&second));

    // Hanging up stops the server
    drop(client);
    server_task.await.unwrap().unwrap();
}
