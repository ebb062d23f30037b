use anyhow::{bail, Context, Result};
use clap::Parser;
use fwdlib::{Config, DatalinkNic, Engine, StrategyKind};
use std::{
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

/// Burst packet forwarder over OS network interfaces
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
	/// TOML configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Strategy to run: echo, ping, switch, router or deaddrop
	#[arg(short, long)]
	strategy: Option<StrategyKind>,

	/// Interfaces to use as ports, in port order
	#[arg(short, long = "port", value_delimiter = ',')]
	ports: Vec<String>,

	/// Log at debug level
	#[arg(short, long)]
	verbose: bool,
}

fn handle_signal(kr: Arc<AtomicBool>) -> Result<()> {
	ctrlc::set_handler(move || {
		kr.store(false, Ordering::SeqCst);
	})
	.context("Error setting Ctrl-C handler")
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	env_logger::Builder::from_env(
		env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
	)
	.init();

	let mut config = match &cli.config {
		Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
		None => Config::default(),
	};
	if let Some(strategy) = cli.strategy {
		config.engine.strategy = strategy;
	}
	if !cli.ports.is_empty() {
		config.engine.ports = cli.ports;
	}
	if config.engine.ports.is_empty() {
		bail!("no ports to forward on; pass --port or set engine.ports");
	}
	config.validate()?;

	log::info!("Initializing {} ports ...", config.engine.ports.len());
	let mempool = config.engine.mempool()?;
	let nic = DatalinkNic::open(&config.engine.ports, mempool).context("opening ports")?;
	let strategy = config
		.build_strategy()
		.with_context(|| format!("setting up {}", config.engine.strategy))?;

	let keep_running = Arc::new(AtomicBool::new(true));
	handle_signal(keep_running.clone())?;

	let mut engine = Engine::new(nic, strategy).with_burst_size(config.engine.burst_size);
	engine.run(&keep_running);
	log::info!("Shutting down");
	Ok(())
}
