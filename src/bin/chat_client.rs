//! Chat Room Client - Entry Point
//!
//! Usage: `chat_client <nickname> [server-addr]`
//!
//! Reads commands from stdin (`\ls`, `\secret`, `\except`, `\ping`,
//! `\quit`, or bare text) and prints whatever the server sends.

use std::env;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chat_room::client::{ClientReader, ClientWriter};
use chat_room::{AppError, ChatClient, ClientCommand, Nickname, ResponseCode};

const DEFAULT_SERVER: &str = "127.0.0.1:30768";

/// Reply timeout for the join handshake
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_room=warn")),
        )
        .init();

    let Some(raw_nickname) = env::args().nth(1) else {
        println!("Please enter your nickname.");
        return Ok(());
    };
    let nickname = match Nickname::parse(&raw_nickname) {
        Ok(nickname) => nickname,
        Err(_) => {
            println!("Please enter a valid nickname.\n(English only, 32 characters or less)");
            return Ok(());
        }
    };
    let server = env::args()
        .nth(2)
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let (client, welcome) = match ChatClient::connect(&server, nickname, JOIN_TIMEOUT).await {
        Ok(joined) => joined,
        Err(AppError::Rejected(reason)) => {
            println!("\n{}\n", reason);
            return Ok(());
        }
        Err(e) => {
            println!("Error connecting to server: {}", e);
            return Ok(());
        }
    };
    println!("\n{}\n", welcome.message);

    let (reader, mut writer) = client.split();
    let ping_sent = Arc::new(Mutex::new(None::<Instant>));
    tokio::spawn(print_responses(reader, Arc::clone(&ping_sent)));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n");
                quit(&mut writer).await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    quit(&mut writer).await;
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                println!();
                match ClientCommand::parse(&line) {
                    Ok(ClientCommand::Quit) => quit(&mut writer).await,
                    Ok(command) => {
                        if command == ClientCommand::Ping {
                            if let Ok(mut sent) = ping_sent.lock() {
                                *sent = Some(Instant::now());
                            }
                        }
                        writer.send(command).await?;
                    }
                    Err(_) => println!("Invalid command.\n"),
                }
            }
        }
    }
}

/// Print server responses; exits the process on kick or shutdown
async fn print_responses(mut reader: ClientReader, ping_sent: Arc<Mutex<Option<Instant>>>) {
    loop {
        match reader.recv().await {
            Ok(Some(response)) => match response.code {
                ResponseCode::PingAck => {
                    let sent = ping_sent.lock().ok().and_then(|mut s| s.take());
                    if let Some(sent) = sent {
                        let rtt = sent.elapsed();
                        println!("RTT = {:.3} ms\n", rtt.as_micros() as f64 / 1000.0);
                    }
                }
                ResponseCode::Reply | ResponseCode::Message => {
                    println!("{}\n", response.message);
                }
                ResponseCode::Error | ResponseCode::Terminated => {
                    println!("{}\n", response.message);
                    process::exit(0);
                }
            },
            Ok(None) | Err(_) => {
                println!("Disconnected from server.");
                process::exit(0);
            }
        }
    }
}

/// Send quit and exit the process
async fn quit(writer: &mut ClientWriter) {
    let _ = writer.send(ClientCommand::Quit).await;
    let _ = writer.close().await;
    println!("gg~");
    process::exit(0);
}
