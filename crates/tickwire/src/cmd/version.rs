use tickwire_frame::{DEFAULT_MAX_PAYLOAD, HEADER_SIZE, HEARTBEAT, USER_PACKET_START};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    let version = env!("CARGO_PKG_VERSION");
    if !args.extended {
        println!("tickwire {version}");
        return Ok(SUCCESS);
    }

    let fields = [
        ("name", "tickwire".to_string()),
        ("version", version.to_string()),
        ("target", env!("TICKWIRE_BUILD_TARGET").to_string()),
        (
            "platform",
            format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        ),
        (
            "git_hash",
            option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        ),
        (
            "wire",
            format!(
                "header={HEADER_SIZE} bytes, max_payload={DEFAULT_MAX_PAYLOAD} bytes, \
                 heartbeat_id={HEARTBEAT}, first_user_id={USER_PACKET_START}"
            ),
        ),
    ];
    for (key, value) in fields {
        println!("{key}: {value}");
    }

    Ok(SUCCESS)
}
