use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use msgpipe_peer::{PeerError, Server, ServerConfig};

use crate::cmd::EchoArgs;
use crate::exit::{peer_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let mut config = ServerConfig {
        encryption: !args.plaintext,
        unmask_permissions: args.unmask,
        ..ServerConfig::default()
    };
    if let Some(base) = args.base_path {
        config.socket_base_path = base;
    }
    if let Some(max) = args.max_msg_size {
        config.max_msg_size = max;
    }

    let server =
        Server::start(&args.name, config).map_err(|err| peer_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        match server.recv() {
            Ok(msg) if msg.is_lifecycle() => {
                if let Some(status) = msg.status {
                    tracing::info!(%status, "connection state changed");
                }
            }
            Ok(msg) => {
                tracing::info!(
                    msg_type = msg.msg_type,
                    size = msg.payload.len(),
                    "echoing message"
                );
                if let Err(err) = server.send(msg.msg_type, msg.payload) {
                    tracing::warn!(error = %err, "echo send failed");
                }
            }
            Err(PeerError::ChannelClosed) => break,
            Err(err) => {
                tracing::warn!(error = %err, "server terminated");
                break;
            }
        }
    }

    server.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
