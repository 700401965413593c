use chrono::Local;
use std::io::{self, BufRead, Write};
use stompwire::{Client, ConnError, Frame};
use tokio::sync::mpsc;

use super::args::Cli;
use super::commands::{Input, parse_command, print_help};
use super::exit_codes;

/// Run the CLI in plain line mode
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    let options = cli
        .connect_options()
        .map_err(|e| (format!("Invalid arguments: {}", e), exit_codes::USAGE))?;
    let address = options.addr();

    println!("Connecting to {}...", address);
    let client = Client::open(options)
        .await
        .map_err(|e| format_connection_error(&e, &address))?;
    println!("Connected.");

    for dest in &cli.subscribe {
        subscribe_destination(&client, dest).await?;
    }

    // Channel to receive user commands from stdin reader
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);

    // Spawn blocking stdin reader
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.blocking_send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    println!();
    print_help();
    println!();

    loop {
        prompt();

        let line = tokio::select! {
            line = cmd_rx.recv() => match line {
                Some(l) => l,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let input = match parse_command(&line) {
            Ok(input) => input,
            Err(msg) => {
                eprintln!("{}", msg);
                continue;
            }
        };

        let result = match input {
            Input::Empty => Ok(()),
            Input::Help => {
                print_help();
                Ok(())
            }
            Input::Quit => break,
            Input::Send { destination, body } => client.send(&destination, body, Vec::new()).await,
            Input::Subscribe(dest) => match subscribe_destination(&client, &dest).await {
                Ok(()) => Ok(()),
                Err((msg, _)) => {
                    eprintln!("{}", msg);
                    Ok(())
                }
            },
            Input::Unsubscribe(dest) => client.unsubscribe(&dest, Vec::new()).await,
            Input::Begin(tx) => client.begin(&tx, Vec::new()).await,
            Input::Commit(tx) => client.commit(&tx, Vec::new()).await,
            Input::Abort(tx) => client.abort(&tx, Vec::new()).await,
        };

        if let Err(e) = result {
            let (msg, code) = format_connection_error(&e, &address);
            if matches!(e, ConnError::InvalidArgument(_)) {
                eprintln!("{}", msg);
                continue;
            }
            return Err((msg, code));
        }
    }

    println!("Disconnecting...");
    if let Err(e) = client.close().await {
        eprintln!("Disconnect failed: {}", e);
    }
    client.join().await;
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

/// Subscribe to a destination, printing every message that arrives for it
async fn subscribe_destination(client: &Client, dest: &str) -> Result<(), (String, u8)> {
    client
        .subscribe(dest, Vec::new(), print_message)
        .await
        .map_err(|e| {
            (
                format!("Failed to subscribe to '{}': {}", dest, e),
                exit_codes::PROTOCOL_ERROR,
            )
        })?;
    println!("Subscribed to: {}", dest);
    Ok(())
}

/// Print an incoming message with a local timestamp
fn print_message(frame: &Frame) {
    let dest = frame.destination().unwrap_or("?");
    println!(
        "\n[{}] [{}] MESSAGE received:",
        Local::now().format("%H:%M:%S%.3f"),
        dest
    );
    for (k, v) in &frame.headers {
        println!("  {}: {}", k, v);
    }
    if !frame.body.is_empty() {
        match std::str::from_utf8(&frame.body) {
            Ok(s) => println!("  Body: {}", s),
            Err(_) => println!("  Body: ({} bytes, binary)", frame.body.len()),
        }
    }
    prompt();
}

/// Format a connection error with user-friendly messaging
fn format_connection_error(err: &ConnError, address: &str) -> (String, u8) {
    match err {
        ConnError::Io(io_err) => {
            let message = match io_err.kind() {
                io::ErrorKind::ConnectionRefused => format!("Connection refused: {}", address),
                io::ErrorKind::TimedOut => format!("Connection timed out: {}", address),
                _ => format!("Connection failed: {}", io_err),
            };
            (message, exit_codes::NETWORK_ERROR)
        }
        ConnError::Framing(msg) => (
            format!("Malformed frame from broker: {}", msg),
            exit_codes::PROTOCOL_ERROR,
        ),
        ConnError::Protocol(msg) => (
            format!("Protocol error: {}", msg),
            exit_codes::PROTOCOL_ERROR,
        ),
        ConnError::InvalidArgument(msg) => (format!("Invalid argument: {}", msg), exit_codes::USAGE),
        ConnError::Closed => ("Connection closed".to_string(), exit_codes::NETWORK_ERROR),
    }
}
