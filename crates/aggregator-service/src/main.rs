use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aggregator_config::ConfigLoader;
use aggregator_core::AggregatorBuilder;

#[derive(Parser)]
#[command(name = "intent-aggregator")]
#[command(about = "Intent auction aggregator", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "AGGREGATOR_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the aggregator
	Start,
	/// Create the relay app session and print its id
	Session,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start(cli).await,
		Some(Commands::Session) => create_session(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start(cli: Cli) -> Result<()> {
	info!("Starting intent auction aggregator");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Ledger RPC: {}", config.ledger.rpc_url);
	info!("Relay: {}", config.relay.url);
	info!("Quote window: {} ms", config.auction.quote_window_ms);
	info!("Poll interval: {} ms", config.auction.poll_interval_ms);

	let engine = Arc::new(
		AggregatorBuilder::new(config)
			.build()
			.await
			.context("Failed to build aggregator")?,
	);

	let runner = Arc::clone(&engine);
	tokio::select! {
		result = runner.run() => {
			result.context("Aggregator terminated")?;
		}
		_ = shutdown_signal() => {
			info!("Shutdown signal received, stopping");
			engine.stop().await;
		}
	}

	info!("Aggregator stopped");
	Ok(())
}

async fn create_session(cli: Cli) -> Result<()> {
	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	let engine = AggregatorBuilder::new(config)
		.build()
		.await
		.context("Failed to build aggregator")?;

	info!(
		"Creating app session with {} participants",
		engine.session_participants().len()
	);

	let session_id = engine
		.setup_session()
		.await
		.context("Failed to create app session")?;

	println!("AGGREGATOR_SESSION_ID={}", session_id);
	println!("Share this id with the quoting agents.");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("  Ledger RPC:    {}", config.ledger.rpc_url);
	info!("  Intent book:   {}", config.ledger.intent_book);
	info!("  Relay:         {}", config.relay.url);
	info!("  Quote window:  {} ms", config.auction.quote_window_ms);
	info!("  Poll interval: {} ms", config.auction.poll_interval_ms);
	info!("  Lookback:      {} blocks", config.auction.lookback_blocks);

	match &config.reputation {
		Some(reputation) => {
			info!(
				"  Reputation:    {} ({} agents mapped)",
				reputation.registry,
				reputation.agents.len()
			);
		}
		None => info!("  Reputation:    disabled"),
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
