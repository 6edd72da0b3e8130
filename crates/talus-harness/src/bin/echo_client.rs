//! Stand-in client peer.
//!
//! Connects to the server, optionally sends a payload and verifies the
//! echoed bytes match, then either exits (with `-X`) or forwards stdin
//! lines interactively. Any failure exits non-zero; the harness reads
//! nothing but the exit code.

use std::io::{BufRead, Read, Write};
use std::net::TcpStream;

use anyhow::{bail, Context, Result};
use clap::Parser;

use talus_harness::env;

#[derive(Parser, Debug)]
#[command(name = "echo_client", about = "talus conformance echo client")]
struct Cli {
    /// Server address.
    addr: String,

    /// Server port.
    port: u16,

    /// Send this payload and require it echoed back verbatim.
    #[arg(short = 'E', long = "echo", value_name = "PHRASE")]
    echo: Option<String>,

    /// Exit as soon as the transfer completes.
    #[arg(short = 'X', long = "exit-after")]
    exit_after: bool,
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

    let mut stream = TcpStream::connect((cli.addr.as_str(), cli.port))
        .with_context(|| format!("connecting to {}:{}", cli.addr, cli.port))?;
    tracing::info!(addr = %cli.addr, port = cli.port, "connected");

    if let Some(phrase) = &cli.echo {
        exchange(&mut stream, phrase)?;
        tracing::info!(bytes = phrase.len(), "echo verified");
    }

    if cli.exit_after {
        return Ok(());
    }

    // Interactive mode: forward stdin lines until EOF.
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        exchange(&mut stream, &line)?;
    }
    Ok(())
}

/// Send `payload` and require the exact bytes echoed back.
fn exchange(stream: &mut TcpStream, payload: &str) -> Result<()> {
    stream.write_all(payload.as_bytes()).context("send")?;
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).context("read echo")?;
    if echoed != payload.as_bytes() {
        bail!(
            "echo mismatch: sent {:?}, got {:?}",
            payload,
            String::from_utf8_lossy(&echoed)
        );
    }
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
