use msgpipe_peer::PROTOCOL_VERSION;

use crate::exit::{CliResult, SUCCESS};

pub fn run() -> CliResult<i32> {
    println!(
        "msgpipe {} (protocol version {})",
        env!("CARGO_PKG_VERSION"),
        PROTOCOL_VERSION
    );
    Ok(SUCCESS)
}
