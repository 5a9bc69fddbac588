mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use uabench_fault::BenchConfig;

use crate::cmd::Command;
use crate::exit::{bench_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "uabench", version, about = "OPC-UA fault injection test bench")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// JSON bench configuration file.
    #[arg(long, value_name = "FILE", global = true, env = "UABENCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn load_config(path: Option<&PathBuf>) -> CliResult<BenchConfig> {
    match path {
        Some(path) => BenchConfig::from_file(path)
            .map_err(|err| bench_error(&format!("config {}", path.display()), err)),
        None => Ok(BenchConfig::default()),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result =
        load_config(cli.config.as_ref()).and_then(|config| cmd::run(cli.command, format, config));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use uabench_frame::StatusCode;

    use super::*;

    #[test]
    fn parses_call_subcommand() {
        let cli = Cli::try_parse_from([
            "uabench",
            "call",
            "127.0.0.1:4840",
            "simulate_session_failure",
            "--wait-fault",
            "500ms",
        ])
        .expect("call args should parse");

        let Command::Call(args) = cli.command else {
            panic!("expected call");
        };
        assert_eq!(args.method, "simulate_session_failure");
        assert_eq!(args.object, "ns=0;i=2253");
        assert_eq!(args.wait_fault.as_deref(), Some("500ms"));
    }

    #[test]
    fn parses_status_by_name_or_hex() {
        for status in ["BadSessionIdInvalid", "0x80250000"] {
            let cli = Cli::try_parse_from(["uabench", "error-frame", "--status", status])
                .expect("error-frame args should parse");
            let Command::ErrorFrame(args) = cli.command else {
                panic!("expected error-frame");
            };
            assert_eq!(args.status, StatusCode::BAD_SESSION_ID_INVALID);
        }
    }

    #[test]
    fn rejects_unknown_status() {
        let err = Cli::try_parse_from(["uabench", "error-frame", "--status", "BadNope"])
            .expect_err("unknown status should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_conflicting_reason_args() {
        let err = Cli::try_parse_from([
            "uabench",
            "error-frame",
            "--status",
            "BadSessionIdInvalid",
            "--reason",
            "x",
            "--null-reason",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/uabench.json");
        assert!(load_config(Some(&path)).is_err());
        assert_eq!(load_config(None).unwrap(), BenchConfig::default());
    }
}
