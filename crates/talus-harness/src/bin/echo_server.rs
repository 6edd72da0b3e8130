//! Stand-in server peer.
//!
//! Listens on the given port and echoes every byte back on each accepted
//! connection, until the harness terminates it. Understands the
//! session-layer environment contract (rendezvous prefix, scope and
//! namespace selectors) and the optional ready-marker handshake.
//!
//! `TALUS_ECHO_MUTE=1` makes the server swallow bytes instead of echoing
//! them — a fault knob for exercising the harness's client-timeout path.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};

use anyhow::{Context, Result};
use clap::Parser;

use talus_harness::env;
use talus_harness::lifecycle::ReadyMarker;

#[derive(Parser, Debug)]
#[command(name = "echo_server", about = "talus conformance echo server")]
struct Cli {
    /// TCP port to listen on.
    port: u16,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();
    log_session_env();

    let mute = std::env::var("TALUS_ECHO_MUTE").is_ok_and(|v| v == "1");
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, cli.port))
        .with_context(|| format!("binding port {}", cli.port))?;
    tracing::info!(port = cli.port, mute, "listening");

    write_ready_marker(cli.port)?;

    loop {
        let (stream, addr) = listener.accept().context("accept")?;
        tracing::info!(%addr, "accepted connection");
        if let Err(e) = serve_connection(stream, mute) {
            tracing::warn!(error = %e, "connection ended with error");
        }
    }
}

fn serve_connection(mut stream: TcpStream, mute: bool) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            tracing::debug!("peer closed");
            return Ok(());
        }
        if !mute {
            stream.write_all(&buf[..n])?;
        }
    }
}

/// Signal readiness through the path the harness exported, if any.
fn write_ready_marker(port: u16) -> Result<()> {
    let Ok(path) = std::env::var(env::READY_FILE) else {
        return Ok(());
    };
    let marker = ReadyMarker {
        pid: std::process::id(),
        port,
    };
    std::fs::write(&path, serde_json::to_vec(&marker)?)
        .with_context(|| format!("writing ready marker {path}"))?;
    tracing::info!(path = %path, "ready marker written");
    Ok(())
}

fn log_session_env() {
    for key in [
        env::API_PREFIX,
        env::SCOPE_LOCAL,
        env::SCOPE_GLOBAL,
        env::NAMESPACE_ID,
        env::NAMESPACE_SECRET,
    ] {
        if let Ok(value) = std::env::var(key) {
            tracing::info!(key, value = %value, "session parameter");
        }
    }
}
