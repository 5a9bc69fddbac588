use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uabench_fault::{BenchConfig, BenchServer};

use crate::cmd::ServeArgs;
use crate::exit::{bench_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct ServeOutput {
    endpoint: String,
    local_addr: String,
    methods: Vec<String>,
    fault_reason: Option<String>,
}

pub fn run(args: ServeArgs, format: OutputFormat, mut config: BenchConfig) -> CliResult<i32> {
    if args.null_reason {
        config.fault_reason = None;
    } else if let Some(reason) = args.reason {
        config.fault_reason = Some(reason);
    }

    let mut server =
        BenchServer::bind(&args.addr, config).map_err(|err| bench_error("bind failed", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;

    let out = ServeOutput {
        endpoint: server.endpoint_url(),
        local_addr: server.local_addr().to_string(),
        methods: server.methods().names().map(str::to_string).collect(),
        fault_reason: server.fault_simulator().reason().map(str::to_string),
    };
    print_ready(&out, format);

    server
        .run(&stop)
        .map_err(|err| bench_error("server failed", err))?;
    Ok(SUCCESS)
}

fn print_ready(out: &ServeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(&[
            ("endpoint", out.endpoint.clone()),
            ("methods", out.methods.join("\n")),
            (
                "fault reason",
                out.fault_reason.clone().unwrap_or_else(|| "<null>".to_string()),
            ),
        ]),
        OutputFormat::Pretty => {
            println!("Listening on {}", out.endpoint);
            for method in &out.methods {
                println!("  method: {method}");
            }
        }
        OutputFormat::Raw => println!("{}", out.endpoint),
    }
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
