//! Typed message and request channels between a main process and its windows.
//!
//! A [`MainEndpoint`] sits in the backend process; every UI process runs a
//! [`WindowEndpoint`]. Both sit on top of any [`Transport`](ipcchan_transport::Transport)
//! and speak in terms of typed channels:
//!
//! ```no_run
//! use std::convert::Infallible;
//!
//! use ipcchan_channel::{define_message_channel, define_request_channel, MessageChannel, RequestChannel};
//! use ipcchan_endpoint::{EndpointConfig, MainEndpoint, WindowEndpoint};
//! use ipcchan_transport::{LocalHub, PeerId};
//!
//! const GREET: RequestChannel<String, String> = define_request_channel("greet");
//! const TICK: MessageChannel<u64> = define_message_channel("tick");
//!
//! # async fn demo() -> ipcchan_endpoint::Result<()> {
//! let hub = LocalHub::new();
//! let (main_tx, main_rx) = hub.attach(PeerId::Main)?;
//! let (win_tx, win_rx) = hub.attach(PeerId::Window("w1".into()))?;
//!
//! let main = MainEndpoint::new(main_tx, main_rx, EndpointConfig::default());
//! main.register_request_listener(&GREET, |name: String| async move {
//!     Ok::<_, Infallible>(format!("hello, {name}"))
//! })?;
//!
//! let window = WindowEndpoint::new("w1", win_tx, win_rx, EndpointConfig::default());
//! window.register_message_listener(&TICK, |n| println!("tick {n}"));
//! window.ready()?;
//!
//! assert_eq!(window.request(&GREET, &"ada".to_string()).await?, "hello, ada");
//! main.send_message(&TICK, &1)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod listener;

mod message;
mod request;

pub use config::EndpointConfig;
pub use correlation::{CorrelationIdGenerator, SequentialIds};
pub use endpoint::{Description, MainEndpoint, WindowEndpoint, WindowSummary, DESCRIBE_CHANNEL};
pub use error::{ChannelError, Result};
pub use lifecycle::{WindowHandle, WindowRegistry, WindowState};
pub use listener::{ListenerId, ListenerRegistry};
