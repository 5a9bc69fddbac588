use serde::Serialize;
use uabench_fault::DEFAULT_FAULT_REASON;
use uabench_frame::build_error_frame;

use crate::cmd::ErrorFrameArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{hex, print_json, print_raw, print_table, OutputFormat, StatusOutput};

#[derive(Serialize)]
struct ErrorFrameOutput {
    status: StatusOutput,
    reason: Option<String>,
    size: usize,
    hex: String,
}

pub fn run(args: ErrorFrameArgs, format: OutputFormat) -> CliResult<i32> {
    let reason = if args.null_reason {
        None
    } else {
        Some(args.reason.unwrap_or_else(|| DEFAULT_FAULT_REASON.to_string()))
    };

    let frame = build_error_frame(args.status, reason.as_deref())
        .map_err(|err| frame_error("encode failed", err))?;

    let out = ErrorFrameOutput {
        status: args.status.into(),
        reason,
        size: frame.len(),
        hex: hex(&frame),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(&[
            ("status", out.status.to_string()),
            (
                "reason",
                out.reason.clone().unwrap_or_else(|| "<null>".to_string()),
            ),
            ("size", out.size.to_string()),
            ("hex", out.hex.clone()),
        ]),
        OutputFormat::Pretty => println!("{}", out.hex),
        OutputFormat::Raw => print_raw(&frame),
    }
    Ok(SUCCESS)
}
