//! Event hub demo server
//!
//! Run with: cargo run --example event_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example event_server                    # binds to 0.0.0.0:8080
//!   cargo run --example event_server localhost          # binds to 127.0.0.1:8080
//!   cargo run --example event_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! ## Talking to it
//!
//! With websocat:
//!   websocat ws://localhost:8080
//!   {"type":"subscribe","topic":"stream_status","payload":{}}
//!   {"type":"start_discovery","topic":"discovery","payload":{"network":"auto"}}
//!
//! ## Simulated backends
//!
//! - Stream manager: publishes `stream_status` updates every two seconds
//! - Discovery: answers `discovery` requests with progress and a result
//! - Recordings: handler installed lazily on first subscription

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::json;

use nvr_events::protocol::constants::{TYPE_PROGRESS, TYPE_RESULT};
use nvr_events::{Envelope, EventHub, HubServer, ServerConfig};

const DEFAULT_PORT: u16 = 8080;

/// Parse bind address from command line argument
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: event_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
}

/// Discovery backend: reports progress, then a result, to the requesting client
fn install_discovery(hub: &Arc<EventHub>) -> nvr_events::Result<()> {
    let weak: Weak<EventHub> = Arc::downgrade(hub);

    hub.register_handler("discovery", move |client_id, payload| {
        tracing::info!(client_id, payload, "Discovery requested");
        let Some(hub) = weak.upgrade() else { return };

        for percent in [25, 50, 75, 100] {
            let raw = format!("{{\"progress\":{}}}", percent);
            hub.send_to_client(
                client_id,
                &Envelope::from_raw_payload(TYPE_PROGRESS, "discovery", &raw),
            );
        }

        let result = json!({"devices": [{"name": "cam1", "address": "192.168.1.20"}]});
        hub.send_to_client(
            client_id,
            &Envelope::from_raw_payload(TYPE_RESULT, "discovery", &result.to_string()),
        );
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nvr_events=debug".parse()?)
                .add_directive("event_server=debug".parse()?),
        )
        .init();

    let hub = Arc::new(EventHub::new());
    hub.initialize()?;
    install_discovery(&hub)?;

    // Recordings backend comes up late; the hub asks for it on demand
    hub.set_registrar(|hub: &EventHub| {
        let _ = hub.register_handler("recordings", |client_id, payload| {
            tracing::info!(client_id, payload, "Recordings request");
        });
    });

    // Stream manager
    let publisher = Arc::clone(&hub);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        let mut running = false;
        loop {
            interval.tick().await;
            running = !running;

            let event = Envelope::new(
                "stream_status",
                "stream_status",
                json!({"name": "cam1", "running": running}),
            );
            let delivered = publisher.broadcast("stream_status", &event);
            tracing::debug!(delivered, running, "Published stream status");
        }
    });

    let config = ServerConfig::default().bind(bind_addr);
    println!("Starting event server on ws://{}", config.bind_addr);

    let server = HubServer::new(config, Arc::clone(&hub));
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = hub.stats();
    println!(
        "Stopped: {} broadcasts, {} deliveries, {} send failures",
        stats.broadcasts, stats.deliveries, stats.send_failures
    );

    Ok(())
}
