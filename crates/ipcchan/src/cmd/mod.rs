use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use ipcchan_endpoint::{EndpointConfig, WindowEndpoint};
use ipcchan_transport::{connect, SocketTransport, TransportError};
use serde_json::Value;

use crate::exit::{io_error, transport_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod info;
pub mod request;
pub mod send;
pub mod serve;
pub mod version;

/// Label the CLI uses for itself when connecting as a window.
const CLI_WINDOW: &str = "cli";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a main process on a socket.
    Serve(ServeArgs),
    /// Call a request channel on a main process and print the answer.
    Request(RequestArgs),
    /// Send one message to a main process.
    Send(SendArgs),
    /// Print the channels and windows a main process knows about.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => block_on(serve::run(args, format)),
        Command::Request(args) => block_on(request::run(args, format)),
        Command::Send(args) => block_on(send::run(args)),
        Command::Info(args) => block_on(info::run(args, format)),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime.block_on(future)
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(env = "IPCCHAN_SOCKET")]
    pub path: PathBuf,
    /// Request channel that answers with its own request.
    #[arg(long, default_value = "echo")]
    pub echo: String,
    /// Message channels to print (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub listen: Vec<String>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Socket path to connect to.
    #[arg(env = "IPCCHAN_SOCKET")]
    pub path: PathBuf,
    /// Request channel id.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// JSON request value. Default: null.
    #[arg(long)]
    pub json: Option<String>,
    /// Maximum time to wait for the answer (e.g. 5s, 500ms).
    #[arg(long, env = "IPCCHAN_REQUEST_TIMEOUT", default_value = "5s")]
    pub timeout: String,
    /// Maximum time to wait for the socket to accept (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    #[arg(env = "IPCCHAN_SOCKET")]
    pub path: PathBuf,
    /// Message channel id.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// JSON message value. Default: null.
    #[arg(long)]
    pub json: Option<String>,
    /// Maximum time to wait for the socket to accept (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Socket path to connect to.
    #[arg(env = "IPCCHAN_SOCKET")]
    pub path: PathBuf,
    /// Connection and answer timeout (e.g. 5s, 500ms).
    #[arg(long, env = "IPCCHAN_REQUEST_TIMEOUT", default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect to a main process as a window, retrying until `timeout` while the
/// socket is missing or refusing.
pub async fn connect_window(
    path: &Path,
    config: EndpointConfig,
    timeout: Duration,
) -> CliResult<(WindowEndpoint, SocketTransport)> {
    let start = Instant::now();
    loop {
        match connect(path).await {
            Ok((transport, inbound)) => {
                let window = WindowEndpoint::new(CLI_WINDOW, transport.clone(), inbound, config);
                return Ok((window, transport));
            }
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(transport_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect timed out after {timeout:?}"),
                    ));
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

fn is_retryable_connect_error(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => {
            source.kind() == std::io::ErrorKind::NotFound
                || source.kind() == std::io::ErrorKind::ConnectionRefused
        }
        _ => false,
    }
}

/// Parse the `--json` argument; absent means `null`.
pub fn parse_json(input: Option<&str>) -> CliResult<Value> {
    match input {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(text)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}"))),
    }
}

/// Parse durations like `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_rejects_zero_and_garbage() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_json_defaults_to_null() {
        assert_eq!(parse_json(None).unwrap(), Value::Null);
        assert_eq!(parse_json(Some("{\"a\":1}")).unwrap()["a"], 1);
        assert_eq!(parse_json(Some("{nope")).unwrap_err().code, USAGE);
    }
}
