use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

const NAME: &str = "vpcd-bridge";

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("{NAME} {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: {NAME}");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("VPCD_BRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "git_hash: {}",
        option_env!("VPCD_BRIDGE_GIT_HASH").unwrap_or("unknown")
    );
    println!("async_codec: {}", cfg!(feature = "async"));
    println!("default_port: {}", vpcd_session::DEFAULT_PORT);
    println!("backends: dummy, relay");

    Ok(SUCCESS)
}
