use std::time::Duration;

use clap::{Args, Subcommand};
use uabench_fault::BenchConfig;
use uabench_frame::StatusCode;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod error_frame;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bench endpoint with the fault methods registered.
    Serve(ServeArgs),
    /// Call a bench method and report what happens afterwards.
    Call(CallArgs),
    /// Print the ERR frame the bench would inject.
    ErrorFrame(ErrorFrameArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: BenchConfig) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format, config),
        Command::Call(args) => call::run(args, format, config),
        Command::ErrorFrame(args) => error_frame::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (`host:port` or `opc.tcp://host:port`).
    pub addr: String,
    /// Reason text of injected ERR frames.
    #[arg(long, conflicts_with = "null_reason")]
    pub reason: Option<String>,
    /// Send injected ERR frames with a null reason.
    #[arg(long)]
    pub null_reason: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Bench endpoint to connect to.
    pub addr: String,
    /// Method name, e.g. `simulate_session_failure`.
    pub method: String,
    /// Node id of the object owning the method.
    #[arg(long, default_value = "ns=0;i=2253")]
    pub object: String,
    /// After the response, wait this long for an ERR frame or a close (e.g. 2s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub wait_fault: Option<String>,
    /// Connect and response timeout.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ErrorFrameArgs {
    /// Status code name (`BadSessionIdInvalid`) or hex (`0x80250000`).
    #[arg(long)]
    pub status: StatusCode,
    /// Reason text. Defaults to the bench's fault reason.
    #[arg(long, conflicts_with = "null_reason")]
    pub reason: Option<String>,
    /// Encode a null reason.
    #[arg(long)]
    pub null_reason: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
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
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
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
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn parse_duration_millis() {
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
