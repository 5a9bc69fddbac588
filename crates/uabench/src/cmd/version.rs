use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("uabench {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: uabench");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("UABENCH_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("protocol_version: {}", uabench_frame::PROTOCOL_VERSION);
    println!(
        "fault_methods: {}",
        uabench_fault::FaultKind::ALL
            .iter()
            .map(|kind| kind.method_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(SUCCESS)
}
