//! A main endpoint and one window in the same process, wired through the
//! in-process hub. The window calls a request channel served by main.
//!
//! Run with:
//!   cargo run --example echo-window

use std::convert::Infallible;

use ipcchan::channel::{define_request_channel, RequestChannel};
use ipcchan::endpoint::{EndpointConfig, MainEndpoint, WindowEndpoint};
use ipcchan::transport::{LocalHub, PeerId};
use serde_json::{json, Value};

const ECHO: RequestChannel<Value, Value> = define_request_channel("echo");
const VERSION: RequestChannel<(), String> = define_request_channel("app:version");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = LocalHub::new();
    let (main_transport, main_inbound) = hub.attach(PeerId::Main)?;
    let (window_transport, window_inbound) = hub.attach(PeerId::Window("editor".into()))?;

    let main = MainEndpoint::new(main_transport, main_inbound, EndpointConfig::default());
    main.register_request_listener(&ECHO, |value: Value| async move {
        Ok::<_, Infallible>(value)
    })?;
    main.register_request_listener(&VERSION, |()| async {
        Ok::<_, Infallible>(env!("CARGO_PKG_VERSION").to_string())
    })?;

    let window = WindowEndpoint::new(
        "editor",
        window_transport,
        window_inbound,
        EndpointConfig::default(),
    );

    for value in [json!("hello"), json!(42), json!({"a": 1})] {
        let answer = window.request(&ECHO, &value).await?;
        println!("echo {value} -> {answer}");
    }
    println!("main runs version {}", window.request_empty(&VERSION).await?);

    // A second handler on the same channel is refused.
    if let Err(err) = main.register_request_listener(&ECHO, |value: Value| async move {
        Ok::<_, Infallible>(value)
    }) {
        println!("{err}");
    }

    Ok(())
}
