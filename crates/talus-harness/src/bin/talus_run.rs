//! Scenario runner.
//!
//! Drives one conformance scenario outside the test framework and prints
//! the verdict as JSON. The cross-table scenario provisions its topology
//! against the in-process control plane; with no real dataplane underneath,
//! the peers ride the host loopback while the routing invariants are
//! checked against the recorded state.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};

use talus_harness::{scenario, RunOptions, Verdict};
use talus_topology::{ControlPlane, DualTableTopology, MemControlPlane, TopologySpec};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioKind {
    /// Both peers in one flat local scope.
    CutThru,
    /// Peers in routing-isolated scopes joined by cross-table routes.
    CrossTable,
}

#[derive(Parser, Debug)]
#[command(name = "talus-run", about = "talus conformance scenario runner")]
struct Cli {
    /// Scenario to run.
    #[arg(value_enum)]
    scenario: ScenarioKind,

    /// TOML file with run options; defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rendezvous prefix shared by both peers.
    #[arg(long, default_value = "talus-run")]
    api_prefix: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let opts = load_options(cli.config.as_deref())?;
    tracing::info!(scenario = ?cli.scenario, ?opts, "starting run");

    let verdict = match cli.scenario {
        ScenarioKind::CutThru => run_cut_thru(&opts, &cli.api_prefix)?,
        ScenarioKind::CrossTable => run_cross_table(&opts, &cli.api_prefix)?,
    };

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    verdict.ensure_pass()?;
    Ok(())
}

fn load_options(path: Option<&std::path::Path>) -> Result<RunOptions> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(RunOptions::default()),
    }
}

fn run_cut_thru(opts: &RunOptions, api_prefix: &str) -> Result<Verdict> {
    let mut cp = MemControlPlane::new();
    cp.session_enable_disable(true)?;

    let result = scenario::cut_thru(opts, api_prefix)?.run();

    cp.session_enable_disable(false)?;
    Ok(result?)
}

fn run_cross_table(opts: &RunOptions, api_prefix: &str) -> Result<Verdict> {
    let mut cp = MemControlPlane::new();
    cp.session_enable_disable(true)?;

    let mut topo = DualTableTopology::provision(&mut cp, TopologySpec::default())?;
    topo.install_cross_routes(&mut cp)?;

    let [server_ns, client_ns] = topo.namespaces();
    let (server_ns, client_ns) = (server_ns.clone(), client_ns.clone());
    let server_table = cp
        .namespace_table(&server_ns.id)
        .context("server namespace has no table")?;
    let client_table = cp
        .namespace_table(&client_ns.id)
        .context("client namespace has no table")?;
    ensure!(
        cp.session_viable(
            client_table,
            topo.table1_addr(),
            server_table,
            topo.table0_addr()
        ),
        "cross-table path is not viable"
    );

    tracing::info!(
        table0_addr = %topo.table0_addr(),
        "in-memory dataplane: peers ride the host loopback"
    );
    let pair = scenario::cross_table(
        opts,
        api_prefix,
        Ipv4Addr::LOCALHOST,
        &server_ns,
        &client_ns,
    )?;
    let result = pair.run();

    // Unwind regardless of the run's outcome.
    topo.teardown(&mut cp)?;
    cp.session_enable_disable(false)?;
    Ok(result?)
}
