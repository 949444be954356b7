use ipcchan_channel::RequestChannel;
use ipcchan_endpoint::EndpointConfig;
use serde_json::Value;

use crate::cmd::{connect_window, parse_duration, parse_json, RequestArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub async fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let value = parse_json(args.json.as_deref())?;

    let config = EndpointConfig::default()
        .with_request_timeout(timeout)
        .with_correlation_prefix("cli");
    let (window, transport) = connect_window(&args.path, config, connect_timeout).await?;

    let channel: RequestChannel<Value, Value> = RequestChannel::from_id(args.channel.clone());
    let response = window
        .request(&channel, &value)
        .await
        .map_err(|err| channel_error("request failed", err))?;
    print_response(&args.channel, &response, format);

    transport.shutdown().await;
    Ok(SUCCESS)
}
