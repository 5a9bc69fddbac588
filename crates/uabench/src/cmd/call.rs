use serde::Serialize;
use uabench_fault::{BenchClient, BenchConfig, BenchError, Observation};
use uabench_frame::CallResponse;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{bench_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_json, print_table, OutputFormat, StatusOutput};

#[derive(Serialize)]
struct FaultOutput {
    /// `error`, `closed`, `message` or `none`.
    kind: &'static str,
    status: Option<StatusOutput>,
    reason: Option<String>,
}

#[derive(Serialize)]
struct CallOutput {
    endpoint: String,
    object: String,
    method: String,
    status: StatusOutput,
    outputs: Vec<String>,
    fault: Option<FaultOutput>,
}

pub fn run(args: CallArgs, format: OutputFormat, mut config: BenchConfig) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let wait_fault = args.wait_fault.as_deref().map(parse_duration).transpose()?;
    config.handshake_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

    let mut client = BenchClient::connect_with_config(&args.addr, &config)
        .map_err(|err| connect_error(err, timeout))?;

    let response = client
        .call(&args.object, &args.method, Vec::new())
        .map_err(|err| bench_error("call failed", err))?;

    let fault = match wait_fault {
        Some(wait) => Some(describe(
            client
                .observe(wait)
                .map_err(|err| bench_error("waiting for fault failed", err))?,
        )),
        None => None,
    };

    let out = CallOutput {
        endpoint: args.addr,
        object: args.object,
        method: args.method,
        status: response.status.into(),
        outputs: response.outputs.iter().map(ToString::to_string).collect(),
        fault,
    };
    print_call(&out, &response, format);

    if response.status.is_bad() {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

fn connect_error(err: BenchError, timeout: std::time::Duration) -> CliError {
    match err {
        BenchError::Frame(uabench_frame::FrameError::Io(io))
            if matches!(
                io.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            CliError::new(TIMEOUT, format!("no ACK within {timeout:?}"))
        }
        other => bench_error("connect failed", other),
    }
}

fn describe(observation: Observation) -> FaultOutput {
    match observation {
        Observation::Error(message) => FaultOutput {
            kind: "error",
            status: Some(message.status.into()),
            reason: message.reason,
        },
        Observation::Closed => FaultOutput {
            kind: "closed",
            status: None,
            reason: None,
        },
        Observation::Chunk(message_type) => FaultOutput {
            kind: "message",
            status: None,
            reason: Some(message_type.to_string()),
        },
        Observation::Quiet => FaultOutput {
            kind: "none",
            status: None,
            reason: None,
        },
    }
}

fn print_call(out: &CallOutput, response: &CallResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut rows = vec![
                ("method", out.method.clone()),
                ("status", out.status.to_string()),
                ("outputs", out.outputs.join(", ")),
            ];
            if let Some(fault) = &out.fault {
                rows.push(("fault", fault_summary(fault)));
            }
            print_table(&rows);
        }
        OutputFormat::Pretty => {
            println!("{} -> {}", out.method, out.status);
            for output in &out.outputs {
                println!("  output: {output}");
            }
            if let Some(fault) = &out.fault {
                println!("  then: {}", fault_summary(fault));
            }
        }
        OutputFormat::Raw => println!("0x{:08X}", response.status.bits()),
    }
}

fn fault_summary(fault: &FaultOutput) -> String {
    match (&fault.status, &fault.reason) {
        (Some(status), Some(reason)) => format!("ERR {status}: {reason}"),
        (Some(status), None) => format!("ERR {status}"),
        (None, Some(detail)) => format!("{} {detail}", fault.kind),
        (None, None) => fault.kind.to_string(),
    }
}
