use std::fs;
use std::io::Write;
use std::time::Duration;

use msgpipe_peer::{Client, ClientConfig, Status};

use crate::cmd::SendArgs;
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let mut config = ClientConfig {
        encryption: !args.plaintext,
        timeout: Some(timeout),
        ..ClientConfig::default()
    };
    if let Some(base) = &args.base_path {
        config.socket_base_path = base.clone();
    }

    let client =
        Client::start(&args.name, config).map_err(|err| peer_error("start failed", err))?;

    // Connection progress arrives in-band; wait for Connected.
    loop {
        let msg = client
            .recv()
            .map_err(|err| peer_error("connect failed", err))?;
        if msg.is_lifecycle() && msg.status == Some(Status::Connected) {
            break;
        }
    }

    client
        .send(args.msg_type, payload)
        .map_err(|err| peer_error("send failed", err))?;

    if args.wait {
        loop {
            let msg = client
                .recv()
                .map_err(|err| peer_error("receive failed", err))?;
            if msg.is_lifecycle() {
                if let Some(status) = msg.status {
                    if status != Status::Connected {
                        return Err(CliError::new(
                            FAILURE,
                            format!("connection lost before reply: {status}"),
                        ));
                    }
                }
                continue;
            }
            print_message(msg.msg_type, msg.payload.as_ref());
            break;
        }
    }

    client.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            CliError::new(FAILURE, format!("failed reading {}: {err}", path.display()))
        });
    }
    Ok(Vec::new())
}

fn print_message(msg_type: i32, payload: &[u8]) {
    match std::str::from_utf8(payload) {
        Ok(text) => println!("[{msg_type}] {text}"),
        Err(_) => {
            print!("[{msg_type}] ");
            let mut out = std::io::stdout();
            let _ = out.write_all(payload);
            let _ = out.flush();
            println!();
        }
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
