//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p finders_client -- [--config client.json] [--addr 127.0.0.1:8087] [--name Alice]
//!
//! The client connects, joins under the configured name, and keeps the
//! roster in sync, logging every change.
//!
//! Console commands:
//!   connect [host:port] - Connect (or reconnect)
//!   disconnect          - Leave and close the connection
//!   name <name>         - Set the name used on the next connect
//!   status              - Show client status
//!   players             - List known players
//!   walk <fwd> <right>  - Hold a movement direction
//!   stop                - Stop moving
//!   quit                - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::Context;
use finders_client::{
    events::{
        Connected, DiagnosticError, Disconnected, PlayerJoined, PlayerLeft, PlayerMoved,
        RosterReset,
    },
    input::InputState,
    GameClient,
};
use finders_shared::{channel::TcpConnector, config::ClientConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = ClientConfig::default();
    if let Some(i) = args.iter().position(|a| a == "--config") {
        let path = args.get(i + 1).context("--config needs a path")?;
        let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
        cfg = ClientConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?;
    }

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

/// Stand-in for a renderer/UI: logs what it would draw.
fn subscribe_presentation(client: &mut GameClient) {
    client.events.subscribe(|e: &Connected| {
        info!(url = %e.url, "Connected");
    });
    client.events.subscribe(|_: &Disconnected| {
        info!("Disconnected");
    });
    client.events.subscribe(|_: &RosterReset| {
        debug!("Roster reset");
    });
    client.events.subscribe(|e: &PlayerJoined| {
        info!(
            player_id = %e.record.id,
            name = %e.record.display_name,
            position = %e.record.position,
            local = e.is_local,
            "Spawn player"
        );
    });
    client.events.subscribe(|e: &PlayerLeft| {
        info!(player_id = %e.player_id, "Despawn player");
    });
    client.events.subscribe(|e: &PlayerMoved| {
        debug!(player_id = %e.player_id, position = %e.position, "Player moved");
    });
    client.events.subscribe(|e: &DiagnosticError| {
        warn!(source = ?e.source, message = %e.message, "Diagnostic");
    });
}

fn parse_walk(tokens: &[&str]) -> Option<InputState> {
    let forward = tokens.get(1)?.parse().ok()?;
    let right = tokens.get(2)?.parse().ok()?;
    Some(InputState {
        forward,
        right,
        up: 0.0,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_url, name = %cfg.player_name, "Starting client");

    let connector = TcpConnector::from_current().context("tokio runtime")?;
    let mut client = GameClient::new(cfg.clone(), connector);
    subscribe_presentation(&mut client);
    client.start();

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Type 'status' for info, 'quit' to exit.");

    let tick = cfg.tick_interval();
    let dt = tick.as_secs_f32();
    let mut ticker = tokio::time::interval(tick);
    let mut input = InputState::default();

    'running: loop {
        ticker.tick().await;

        while let Ok(line) = console_rx.try_recv() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.first().copied() {
                Some("quit") | Some("exit") => break 'running,
                Some("walk") => match parse_walk(&tokens) {
                    Some(walk) => input = walk,
                    None => println!("Usage: walk <forward> <right>"),
                },
                Some("stop") => input = InputState::default(),
                _ => {
                    for out in client.exec_console(&line) {
                        println!("{out}");
                    }
                }
            }
        }

        client.update(tick);
        client.submit_local_displacement(
            input.displacement(client.config().move_speed, dt),
            dt,
            Instant::now(),
        );
    }

    client.shutdown();
    // Let the channel task flush `Leave` before the runtime goes away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
