use std::convert::Infallible;

use ipcchan_channel::{MessageChannel, RequestChannel};
use ipcchan_endpoint::{EndpointConfig, MainEndpoint};
use ipcchan_transport::{inbound_channel, SocketListener};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{channel_error, io_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        SocketListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let (inbound_tx, inbound_rx) = inbound_channel();
    let main = MainEndpoint::new(listener.transport(), inbound_rx, EndpointConfig::default());

    let echo: RequestChannel<Value, Value> = RequestChannel::from_id(args.echo.clone());
    main.register_request_listener(&echo, |value: Value| async move {
        Ok::<_, Infallible>(value)
    })
    .map_err(|err| channel_error("register failed", err))?;
    main.expose_introspection()
        .map_err(|err| channel_error("register failed", err))?;

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<(String, Value)>();
    for id in &args.listen {
        let channel: MessageChannel<Value> = MessageChannel::from_id(id.clone());
        let tx = seen_tx.clone();
        let id = id.clone();
        main.register_message_listener(&channel, move |value: Value| {
            let _ = tx.send((id.clone(), value));
        });
    }
    drop(seen_tx);

    info!(path = %listener.path().display(), echo = %args.echo, "serving");

    let accept = listener.run(inbound_tx);
    tokio::pin!(accept);
    let mut printed = 0usize;

    loop {
        tokio::select! {
            result = &mut accept => {
                return result
                    .map(|()| SUCCESS)
                    .map_err(|err| transport_error("accept failed", err));
            }
            Some((channel, value)) = seen_rx.recv() => {
                print_message(&channel, &value, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    return Ok(SUCCESS);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|err| io_error("signal handler setup failed", err))?;
                info!("interrupted");
                return Ok(SUCCESS);
            }
        }
    }
}
