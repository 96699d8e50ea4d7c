//! Example service exposing the account registration endpoint.
//!
//! ```text
//! PORT=8080 LOGGER_TYPE=Console PROJECT_ID=demo \
//!   FIREBASE_AUTH_EMULATOR_HOST=localhost:9099 cargo run --bin gantry-example
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gantry_server::auth::{
    AccountRegistration, FirebaseAuth, FirebaseAuthConfig, IdentityProvider,
    InMemoryIdentityProvider,
};
use gantry_server::network::handlers::register_routes;
use gantry_server::{ServiceInstance, ShutdownOutcome};

#[derive(Debug, Parser)]
#[command(name = "gantry-example", version, about = "Account registration example service")]
struct Cli {
    /// Keep accounts in memory instead of calling Firebase Authentication
    #[arg(long, env = "GANTRY_IN_MEMORY_AUTH")]
    in_memory_auth: bool,
}

async fn run(cli: Cli) -> anyhow::Result<ShutdownOutcome> {
    let provider: Arc<dyn IdentityProvider> = if cli.in_memory_auth {
        Arc::new(InMemoryIdentityProvider::new())
    } else {
        let config = FirebaseAuthConfig::from_env().context("firebase auth configuration")?;
        Arc::new(FirebaseAuth::new(config))
    };
    let router = register_routes(AccountRegistration::new(provider));

    let instance = ServiceInstance::from_env("example-app", env!("CARGO_PKG_VERSION"), router)?;
    Ok(instance.start().await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) if outcome.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
