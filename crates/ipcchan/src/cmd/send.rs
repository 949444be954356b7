use ipcchan_channel::MessageChannel;
use ipcchan_endpoint::EndpointConfig;
use serde_json::Value;
use tracing::debug;

use crate::cmd::{connect_window, parse_duration, parse_json, SendArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};

pub async fn run(args: SendArgs) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let value = parse_json(args.json.as_deref())?;

    let (window, transport) =
        connect_window(&args.path, EndpointConfig::default(), connect_timeout).await?;

    let channel: MessageChannel<Value> = MessageChannel::from_id(args.channel.clone());
    window
        .send_message(&channel, &value)
        .map_err(|err| channel_error("send failed", err))?;

    // Exit only once the message has left the process.
    transport.shutdown().await;
    debug!(channel = %args.channel, "message sent");
    Ok(SUCCESS)
}
