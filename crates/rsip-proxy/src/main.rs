//! # rsip-proxy
//!
//! Entry point: parse flags, load configuration, wire the kernel adapter
//! into a chooser and run the SOCKS5 server until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags and load the optional TOML file
//! 2. Initialize logging (`RUST_LOG`, or `--debug`)
//! 3. Build the chooser for the selected mode
//! 4. Rotating mode: first rotation, then refresher and triggers
//! 5. Serve SOCKS5 until shutdown or a fatal pool error
//!
//! A fatal pool error drains the pool and exits non-zero.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rsip_proxy::{Mode, ProxyConfig};

#[derive(Debug, Parser)]
#[command(name = "rsip-proxy", version, about = "SOCKS5 proxy with per-connection IPv6 source selection")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration file
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Source address strategy, overrides the configuration file
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn load_config(&self) -> Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ProxyConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(debug: bool) -> Result<()> {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;
    let config = args.load_config()?;

    info!(bind = %config.bind, mode = ?config.mode, "starting rsip-proxy");
    run(config).await
}

#[cfg(target_os = "linux")]
async fn run(config: ProxyConfig) -> Result<()> {
    use std::sync::Arc;

    use rsip_proxy::rotation::spawn_stdin_reader;
    use rsip_proxy::{SocksServer, Supervisor};
    use rsip_selection::{
        AddressPool, BindingDialer, EgressResolver, NetlinkKernel, OsRandomSource, PoolChooser,
        RandomPickChooser, SeededRandomSource, SourceAddressChooser,
    };
    use tracing::warn;

    let kernel = Arc::new(NetlinkKernel::new());
    let egress = EgressResolver::new(kernel.clone());

    let mut pool = None;
    let chooser: Arc<dyn SourceAddressChooser> = match config.mode {
        Mode::Rotating => {
            let managed = Arc::new(AddressPool::new(
                kernel.clone(),
                Arc::new(OsRandomSource),
                config.pool.clone(),
            )?);
            let epoch = managed.rotate().context("initial rotation")?;
            info!(epoch = epoch.number, "address pool ready");
            pool = Some(managed.clone());
            Arc::new(PoolChooser::new(egress, managed))
        }
        Mode::Random => {
            let random = match config.seed {
                Some(seed) => SeededRandomSource::from_seed_u64(seed),
                None => SeededRandomSource::from_entropy(),
            };
            Arc::new(RandomPickChooser::new(egress, kernel.clone(), Arc::new(random)))
        }
    };

    let dialer = BindingDialer::new(chooser).with_connect_timeout(config.connect_timeout);
    let server = SocksServer::bind(config.bind, dialer)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    let server = server.spawn();

    let outcome = match pool {
        Some(pool) => {
            let rotate_requests = match spawn_stdin_reader() {
                Ok(rx) => Some(rx),
                Err(e) => {
                    warn!(error = %e, "stdin rotation trigger unavailable");
                    None
                }
            };
            info!("press Enter to rotate source addresses, Ctrl+C to stop");
            let supervisor = Supervisor {
                pool,
                refresh_period: config.pool.refresh_interval,
                rotate_interval: config.rotate_interval,
                rotate_requests,
                server: Some(server),
            };
            supervisor
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "listening for Ctrl+C failed");
                    }
                })
                .await
                .context("address pool failed")
        }
        None => {
            let signal = tokio::signal::ctrl_c().await;
            server.stop().await;
            signal.context("listening for Ctrl+C")
        }
    };

    info!("rsip-proxy stopped");
    outcome
}

#[cfg(not(target_os = "linux"))]
async fn run(_config: ProxyConfig) -> Result<()> {
    anyhow::bail!("rsip-proxy needs the Linux rtnetlink adapter")
}
