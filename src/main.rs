use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleetprobe::logging::{self, LogFormat};
use fleetprobe::server::{self, AppState};
use fleetprobe::{
    netdetect, ports, targets, EmptyHostPolicy, FleetScanner, PortSpec, Protocol, ScanConfig,
    ScanReport, ScanScope,
};

/// fleetprobe: bounded, concurrent TCP reachability scans across many hosts.
#[derive(Debug, Clone, Parser)]
#[command(name = "fleetprobe", version, about, long_about = None)]
struct Cli {
    /// Hosts, IPs, IPv4 CIDRs or paths to target files. If omitted, auto-detect local /24s.
    #[arg(long, num_args = 1..)]
    targets: Vec<String>,

    /// Ports to probe, e.g. `1-1024` or `22,80,8000-8010`.
    #[arg(long, conflicts_with_all = ["ports_file", "scope"])]
    ports: Option<String>,

    /// File with one port or range per line.
    #[arg(long = "ports-file", conflicts_with = "scope")]
    ports_file: Option<PathBuf>,

    /// Preset port range used when no ports are given.
    #[arg(long, value_enum, default_value_t = ScanScope::Quick)]
    scope: ScanScope,

    /// Transport protocol. Only tcp is supported.
    #[arg(long, default_value = "tcp")]
    protocol: String,

    /// Per-connection timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 500)]
    timeout_ms: u64,

    /// Max hosts scanned at once (unbounded if omitted).
    #[arg(long = "max-hosts")]
    max_hosts: Option<usize>,

    /// Max in-flight probes per host (unbounded if omitted).
    #[arg(long = "max-ports-per-host")]
    max_ports_per_host: Option<usize>,

    /// Also report hosts with no open ports.
    #[arg(long = "keep-empty", default_value_t = false)]
    keep_empty: bool,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the report as JSON on stdout instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Serve the HTTP API on this address instead of scanning once (e.g. 127.0.0.1:8080).
    #[arg(long)]
    serve: Option<String>,

    /// Print local IPv4 interface configuration (optionally for one device) and exit.
    #[arg(long, num_args = 0..=1, value_name = "DEVICE")]
    interfaces: Option<Option<String>>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format)?;

    if let Some(device) = &cli.interfaces {
        return print_interfaces(device.as_deref());
    }

    if let Some(bind) = cli.serve.as_deref() {
        println!("Serving API on http://{bind}/api (Ctrl+C to stop)");
        tokio::select! {
            res = server::spawn_server(bind, AppState::new()) => res?,
            _ = tokio::signal::ctrl_c() => info!("shutting down"),
        }
        return Ok(());
    }

    let targets = resolve_targets(&cli)?;
    let config = build_config(&cli)?;

    if !cli.json {
        print_config(&cli, &targets, &config);
    }

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling scan");
            cancel_ctrlc.cancel();
        }
    });

    let report = FleetScanner::new()
        .with_cancel(cancel)
        .scan(targets.as_slice(), &config)
        .await
        .context("scan did not complete")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_results_table(&report);
    }
    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)?;
        if !cli.json {
            println!("Wrote JSON report to {}", path.display());
        }
    }

    Ok(())
}

fn resolve_targets(cli: &Cli) -> Result<Vec<String>> {
    if !cli.targets.is_empty() {
        return Ok(targets::expand_targets(&cli.targets)?);
    }

    let cidrs = netdetect::detect_local_cidrs().context("failed to detect local networks")?;
    if cidrs.is_empty() {
        bail!("no targets given and no local IPv4 network detected");
    }
    let mut out = Vec::new();
    for cidr in cidrs {
        let ips = netdetect::expand_cidr_to_ips(cidr);
        info!(%cidr, hosts = ips.len(), "auto-detected local network");
        out.extend(ips.into_iter().map(|ip| ip.to_string()));
    }
    Ok(out)
}

fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let port_spec = if let Some(spec) = cli.ports.as_deref() {
        ports::parse_port_spec(spec)?
    } else if let Some(path) = cli.ports_file.as_deref() {
        PortSpec::Set(ports::load_ports_from_path(path)?)
    } else {
        cli.scope.ports()
    };

    let mut config = ScanConfig::new(port_spec).timeout(Duration::from_millis(cli.timeout_ms));
    config.protocol = cli.protocol.parse::<Protocol>()?;
    config.max_concurrent_hosts = cli.max_hosts;
    config.max_concurrent_ports_per_host = cli.max_ports_per_host;
    if cli.keep_empty {
        config.empty_hosts = EmptyHostPolicy::Keep;
    }
    config.validate().context("invalid scan configuration")?;
    Ok(config)
}

fn print_config(cli: &Cli, targets: &[String], config: &ScanConfig) {
    let limit = |v: Option<usize>| v.map_or_else(|| "unbounded".to_string(), |n| n.to_string());
    println!("fleetprobe configuration:");
    println!("  targets      : {}", targets.len());
    println!(
        "  ports        : {}",
        cli.ports
            .clone()
            .or_else(|| cli.ports_file.as_ref().map(|p| p.display().to_string()))
            .unwrap_or_else(|| format!("{:?} scope", cli.scope).to_lowercase())
    );
    println!("  protocol     : {}", config.protocol);
    println!("  timeout_ms   : {}", config.timeout.as_millis());
    println!("  max hosts    : {}", limit(config.max_concurrent_hosts));
    println!("  max ports    : {}", limit(config.max_concurrent_ports_per_host));
}

fn print_results_table(report: &ScanReport) {
    let target_w = report
        .results()
        .iter()
        .map(|r| r.target.len())
        .max()
        .unwrap_or(0)
        .max("target".len());

    println!(
        "\nHosts with open ports: {} (open ports: {})",
        report.len(),
        report.open_port_count()
    );
    println!("{:<target_w$}  {:<5}  ports", "target", "proto");
    println!("{:-<target_w$}  {:-<5}  {:-<5}", "", "", "");
    for r in report.results() {
        let ports = r
            .open_ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        println!("{:<target_w$}  {:<5}  {}", r.target, r.protocol, ports);
    }
}

fn print_interfaces(device: Option<&str>) -> Result<()> {
    let list = match device {
        Some(name) => match netdetect::interface_info(name)? {
            Some(info) => vec![info],
            None => bail!("device {name} has no IPv4 address"),
        },
        None => netdetect::list_interfaces()?,
    };
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(())
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
