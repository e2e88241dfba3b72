//! Main entry point for CLI command to start server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::binder::DEFAULT_SCHEMA;
use crate::binder::MockSchema;
use crate::provider::Faker;
use crate::server::MockServer;

/// Options for the mock server
#[derive(Parser, Debug)]
#[command(name = "fakeql", about = "GraphQL mock-data server")]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(
        long = "log",
        default_value = "info",
        alias = "log-level",
        env = "FAKEQL_LOG"
    )]
    log_level: String,

    /// Schema location relative to the current directory. The canned
    /// storefront schema is served when unset.
    #[arg(short, long = "schema", env = "FAKEQL_SCHEMA_PATH")]
    schema_path: Option<PathBuf>,

    /// Address to listen on.
    #[arg(
        long = "listen",
        default_value = "127.0.0.1:4000",
        env = "FAKEQL_LISTEN_ADDRESS"
    )]
    listen_address: SocketAddr,

    /// Delay of the default Product.name resolver.
    #[arg(
        long,
        default_value = "1s",
        value_parser = humantime::parse_duration,
        env = "FAKEQL_RESOLVER_LATENCY"
    )]
    resolver_latency: Duration,

    /// Simulated backend latency of the default product batch fetch.
    #[arg(
        long,
        default_value = "1s",
        value_parser = humantime::parse_duration,
        env = "FAKEQL_FETCH_LATENCY"
    )]
    fetch_latency: Duration,

    /// How long batch windows collect keys before flushing.
    #[arg(
        long,
        default_value = "1ms",
        value_parser = humantime::parse_duration,
        env = "FAKEQL_BATCH_WINDOW"
    )]
    batch_window: Duration,

    /// Seed for the fake value provider, for reproducible responses.
    #[arg(long, env = "FAKEQL_SEED")]
    seed: Option<u64>,

    /// Display version and exit.
    #[arg(long, short = 'V')]
    version: bool,
}

/// This is the main server entrypoint.
///
/// Parses commandline options, sets up logging and serves until
/// interrupted.
pub fn main() -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = std::env::var("FAKEQL_NUM_CORES")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;
    runtime.block_on(rt_main())
}

async fn rt_main() -> Result<()> {
    let opt = Opt::parse();

    if opt.version {
        println!("{}", std::env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let env_filter = std::env::var("RUST_LOG").ok().unwrap_or(opt.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&env_filter).context("could not parse log")?)
        .init();

    let sdl = match &opt.schema_path {
        Some(path) => {
            let path = if path.is_relative() {
                std::env::current_dir()?.join(path)
            } else {
                path.clone()
            };
            tracing::info!(schema = %path.display(), "serving schema from file");
            std::fs::read_to_string(&path)
                .with_context(|| format!("could not read schema at {}", path.display()))?
        }
        None => {
            tracing::info!("no schema supplied, serving the canned storefront schema");
            DEFAULT_SCHEMA.to_string()
        }
    };

    let mut builder = MockSchema::builder()
        .schema(sdl)
        .resolver_latency(opt.resolver_latency)
        .fetch_latency(opt.fetch_latency)
        .batch_window(opt.batch_window);
    if let Some(seed) = opt.seed {
        builder = builder.provider(Faker::seeded(seed));
    }
    let schema = builder.build()?;

    MockServer::builder()
        .schema(schema)
        .listen_address(opt.listen_address)
        .build()
        .serve()
        .await
}
