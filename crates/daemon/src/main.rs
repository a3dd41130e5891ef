use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use scout_daemon::identity::{DeviceIdentity, TrustStore};
use scout_daemon::logging::init_logging;
use scout_daemon::server::{Daemon, DaemonConfig};
use scout_driver::cdp::CdpLauncher;

/// Scout: headless-browser automation daemon.
#[derive(Debug, Parser)]
#[command(name = "scoutd", version, about)]
struct Args {
	/// Address to listen on.
	#[arg(long, default_value = "127.0.0.1:9744")]
	listen: String,

	/// Serve plaintext instead of mutual TLS.
	#[arg(long)]
	insecure: bool,

	/// Directory holding the device identity and trust store.
	#[arg(long)]
	identity_dir: Option<PathBuf>,

	/// Enroll a peer device ID into the trust store and exit.
	#[arg(long, value_name = "DEVICE_ID")]
	trust: Option<String>,

	/// Print this daemon's device ID and exit.
	#[arg(long)]
	show_identity: bool,

	/// Maximum concurrent sessions (0 = unlimited).
	#[arg(long, default_value_t = 0)]
	max_sessions: usize,

	/// Maximum RPC message size in MiB, both directions.
	#[arg(long, default_value_t = 64)]
	max_message_mib: u32,

	/// Deadline for destroying sessions on shutdown, in seconds.
	#[arg(long, default_value_t = 20)]
	shutdown_deadline_secs: u64,

	/// Increase log verbosity (-v, -vv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

fn default_identity_dir() -> PathBuf {
	dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("scout")
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_logging(args.verbose);

	let identity_dir = args.identity_dir.clone().unwrap_or_else(default_identity_dir);

	if args.show_identity {
		let identity = DeviceIdentity::load_or_generate(&identity_dir)?;
		println!("{}", identity.device_id());
		return Ok(());
	}

	if let Some(device_id) = &args.trust {
		let trust = TrustStore::load(&identity_dir).context("loading trust store")?;
		if trust.add(device_id)? {
			println!("trusted {device_id}");
		} else {
			println!("{device_id} already trusted");
		}
		return Ok(());
	}

	let config = DaemonConfig {
		listen: args.listen,
		insecure: args.insecure,
		identity_dir,
		max_sessions: args.max_sessions,
		max_message_mib: args.max_message_mib,
		shutdown_deadline: Duration::from_secs(args.shutdown_deadline_secs),
	};

	Daemon::new(config, Arc::new(CdpLauncher)).run().await
}
