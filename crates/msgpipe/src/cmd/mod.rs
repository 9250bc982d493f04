use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;

pub mod echo;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an echo server on a named endpoint.
    Echo(EchoArgs),
    /// Connect and send a single message.
    Send(SendArgs),
    /// Show version information.
    Version,
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args),
        Command::Send(args) => send::run(args),
        Command::Version => version::run(),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Endpoint name to listen on.
    pub name: String,
    /// Base directory for the endpoint path.
    #[arg(long, value_name = "DIR")]
    pub base_path: Option<PathBuf>,
    /// Disable session encryption.
    #[arg(long)]
    pub plaintext: bool,
    /// Allow any local user to connect.
    #[arg(long)]
    pub unmask: bool,
    /// Maximum message size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_msg_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint name to connect to.
    pub name: String,
    /// Message type tag (positive; 0 is reserved).
    #[arg(long = "type", short = 't', default_value = "1")]
    pub msg_type: i32,
    /// JSON payload (validated before sending).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Base directory for the endpoint path.
    #[arg(long, value_name = "DIR")]
    pub base_path: Option<PathBuf>,
    /// Accept a plaintext session if the server offers one.
    #[arg(long)]
    pub plaintext: bool,
    /// Connection deadline (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Wait for one reply message and print it.
    #[arg(long)]
    pub wait: bool,
}
