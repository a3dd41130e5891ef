use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	// 0 = service default (info for scout, quiet driver internals)
	// 1 (-v) = debug for scout crates
	// 2+ (-vv) = trace for everything
	let filter = match verbosity {
		0 => "info,chromiumoxide=warn,scout_driver=warn",
		1 => "info,scout_core=debug,scout_daemon=debug,chromiumoxide=warn",
		_ => "trace",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
