// Mesh node daemon: one protocol engine driven over a UDP broadcast link.

mod commands;
mod config;
mod transport;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use meshnet_core::{Action, MeshEngine, PhysicalAddress};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::commands::Command;
use crate::config::{Config, LogFormat};
use crate::transport::{UdpLink, MAX_DATAGRAM_LEN};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("meshnet-linux {}", VERSION);
            return Ok(());
        }
    }

    let cfg = config::load()?;
    init_tracing(&cfg);
    let address = cfg.node_address();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cfg, address))
}

fn init_tracing(cfg: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log_level));
    match cfg.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

/// Single owner of the engine: frames, ticks, operator commands and shutdown
/// are multiplexed onto this one task so engine calls never overlap.
async fn run(cfg: Config, address: PhysicalAddress) -> Result<()> {
    let mut engine = MeshEngine::with_config(address, cfg.mesh.clone())
        .context("invalid [mesh] configuration")?;
    engine.set_gateway_mode(cfg.gateway);

    let max_neighbors = engine.peers().capacity();
    let mut link = UdpLink::bind(address, cfg.port, cfg.broadcast_addr, max_neighbors)
        .await
        .with_context(|| format!("binding UDP port {}", cfg.port))?;
    info!(%address, port = cfg.port, gateway = cfg.gateway, "mesh node started");

    let clock = Instant::now();
    let now_ms = || clock.elapsed().as_millis() as u64;

    let actions = engine.send_discovery();
    perform(&link, actions).await;

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_ms.max(1)));
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let actions = engine.on_tick(now_ms());
                if !actions.is_empty() {
                    // Heartbeat pass: peer eviction just ran.
                    let peers = engine.peers();
                    link.retain_neighbors(|a| peers.find(a).is_some());
                }
                perform(&link, actions).await;
            }
            received = link.recv(&mut buf) => match received {
                Ok(Some(frame)) => {
                    let actions = engine.on_receive(&frame, now_ms());
                    perform(&link, actions).await;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "udp receive failed"),
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let actions = handle_command(&mut engine, &line);
                    perform(&link, actions).await;
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            res = &mut shutdown => {
                res?;
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn handle_command(engine: &mut MeshEngine, line: &str) -> Vec<Action> {
    let cmd = match Command::parse(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return Vec::new(),
        Err(e) => {
            eprintln!("{e}");
            return Vec::new();
        }
    };
    match cmd {
        Command::Send(to, payload) => engine.send_data(to, &payload),
        Command::Uplink(payload) => engine.send_to_gateway(&payload).unwrap_or_else(|| {
            eprintln!("no gateway known");
            Vec::new()
        }),
        Command::Route(to) => engine.send_route_request(to),
        Command::Discover => engine.send_discovery(),
        Command::Gateway(on) => {
            engine.set_gateway_mode(on);
            Vec::new()
        }
        Command::Status => {
            print_status(engine);
            Vec::new()
        }
    }
}

fn print_status(engine: &MeshEngine) {
    let status = serde_json::json!({
        "address": engine.address(),
        "gateway": engine.is_gateway(),
        "config": engine.config(),
        "peers": engine.peers().iter().collect::<Vec<_>>(),
        "routes": engine.routes().iter().collect::<Vec<_>>(),
        "nearest_gateway": engine.nearest_gateway().map(|p| p.address),
    });
    match serde_json::to_string_pretty(&status) {
        Ok(s) => println!("{s}"),
        Err(e) => warn!(error = %e, "failed to render status"),
    }
}

/// Hand engine actions to the link; deliveries go to the log and stdout.
/// Send failures are logged and not retried.
async fn perform(link: &UdpLink, actions: Vec<Action>) {
    for action in actions {
        match action {
            Action::Send(to, frame) => {
                if let Err(e) = link.send(to, &frame).await {
                    warn!(error = %e, "send failed");
                }
            }
            Action::Deliver(source, payload) => {
                info!(%source, len = payload.len(), "data received");
                println!("{} {}", source, String::from_utf8_lossy(&payload));
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
