use ipcchan_endpoint::{EndpointConfig, DESCRIBE_CHANNEL};

use crate::cmd::{connect_window, parse_duration, InfoArgs};
use crate::exit::{channel_error, CliResult, SUCCESS};
use crate::output::{print_description, OutputFormat};

pub async fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = EndpointConfig::default()
        .with_request_timeout(timeout)
        .with_correlation_prefix("cli");
    let (window, transport) = connect_window(&args.path, config, timeout).await?;

    let description = window
        .request_empty(&DESCRIBE_CHANNEL)
        .await
        .map_err(|err| channel_error("describe failed", err))?;
    print_description(&description, format);

    transport.shutdown().await;
    Ok(SUCCESS)
}
