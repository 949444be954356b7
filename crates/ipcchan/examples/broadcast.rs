//! Broadcast from main to windows: only windows that announced themselves
//! ready receive messages, and closing a window stops delivery to it.
//!
//! Run with:
//!   cargo run --example broadcast

use std::time::Duration;

use ipcchan::channel::{define_message_channel, MessageChannel};
use ipcchan::endpoint::{EndpointConfig, MainEndpoint, WindowEndpoint};
use ipcchan::transport::{LocalHub, PeerId};

const CLUSTERS_CHANGED: MessageChannel<Vec<String>> = define_message_channel("clusters:changed");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = LocalHub::new();
    let (main_transport, main_inbound) = hub.attach(PeerId::Main)?;
    let main = MainEndpoint::new(main_transport, main_inbound, EndpointConfig::default());

    let mut windows = Vec::new();
    for name in ["dashboard", "terminal", "settings"] {
        let (transport, inbound) = hub.attach(PeerId::Window(name.into()))?;
        let window = WindowEndpoint::new(name, transport, inbound, EndpointConfig::default());
        window.register_message_listener(&CLUSTERS_CHANGED, move |clusters: Vec<String>| {
            println!("{name} sees {clusters:?}");
        });
        windows.push(window);
    }

    // "settings" never announces itself, so it is not a broadcast target.
    windows[0].ready()?;
    windows[1].ready()?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    main.send_message(&CLUSTERS_CHANGED, &vec!["minikube".to_string()])?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Some(terminal) = main.windows().get(windows[1].id()) {
        main.close_window(&terminal);
    }
    main.send_message(
        &CLUSTERS_CHANGED,
        &vec!["minikube".to_string(), "staging".to_string()],
    )?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for window in main.windows().list() {
        println!("{} is {}", window.id(), window.state());
    }
    Ok(())
}
