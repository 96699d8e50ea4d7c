//! Serves a directory of static assets with a single-page-app fallback.

use std::path::PathBuf;
use std::process::ExitCode;

use axum::Router;
use clap::Parser;
use gantry_server::network::{with_static_assets, StaticAssetsConfig};
use gantry_server::{ServiceInstance, ShutdownOutcome};

#[derive(Debug, Parser)]
#[command(name = "gantry-static", version, about = "Static asset server")]
struct Cli {
    /// Directory served under the static path
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    public_dir: PathBuf,
    /// File returned for every path no other route matches
    #[arg(long, env = "INDEX_FILE", default_value = "public/index.html")]
    index_file: PathBuf,
    /// Route prefix of the static files
    #[arg(long, env = "STATIC_PATH", default_value = "/static/")]
    static_path: String,
    /// Cache-Control max-age for static files, in seconds
    #[arg(long, env = "CACHE_MAX_AGE", default_value_t = 3600)]
    max_age: u32,
}

impl From<Cli> for StaticAssetsConfig {
    fn from(cli: Cli) -> Self {
        Self {
            public_dir: cli.public_dir,
            index_file: cli.index_file,
            static_path: cli.static_path,
            cache_max_age: cli.max_age,
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ShutdownOutcome> {
    let router = with_static_assets(Router::new(), &cli.into())?;
    let instance = ServiceInstance::from_env("static-app", env!("CARGO_PKG_VERSION"), router)?;
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
