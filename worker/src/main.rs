pub mod agent;
pub mod cni;
pub mod collectors;
pub mod runtime;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use models::models::settings::Settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
	dotenv::dotenv().ok();
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	match run().await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			tracing::error!("fatal: {err:#}");
			ExitCode::FAILURE
		}
	}
}

async fn run() -> anyhow::Result<()> {
	let settings = Settings::load(config_dir_from_args().as_deref())?;
	let agent = agent::Agent::connect(settings).await?;
	agent.run().await
}

/// `--config-dir <dir>` on the command line, mirroring the principal binary.
fn config_dir_from_args() -> Option<PathBuf> {
	let mut args = env::args().skip(1);
	while let Some(arg) = args.next() {
		if arg == "--config-dir" {
			return args.next().map(PathBuf::from);
		}
		if let Some(value) = arg.strip_prefix("--config-dir=") {
			return Some(PathBuf::from(value));
		}
	}
	None
}
