pub mod api;
pub mod auth;
pub mod dispatch;
pub mod placement;
pub mod registry;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use models::models::routing::RouteKey;
use models::models::settings::Settings;
use tracing_subscriber::EnvFilter;

use crate::api::server::AppState;
use crate::auth::TokenAuthority;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;

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
    let router = RouteKey::new(&settings.encryption.key)?;

    let registry = Registry::connect(&settings.redis.url).await?;
    if let Some(seed) = &settings.admin {
        registry
            .put_user_hash(&seed.username, &router.credential_hash(&seed.password))
            .await?;
        tracing::info!(user = %seed.username, "seeded admin credential");
    }

    let dispatcher = Dispatcher::connect(&settings.amqp.url, registry.backend()).await?;
    let tokens = TokenAuthority::new(&settings.encryption.key);

    let state = AppState {
        settings,
        router,
        registry,
        dispatcher,
        tokens,
    };
    api::server::serve(state).await
}

/// `--config-dir <dir>` on the command line, mirroring the worker binary.
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
