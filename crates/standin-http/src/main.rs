use anyhow::Context;
use clap::Parser;
use standin_http::config::{ConfigError, ServerConfig, DEFAULT_PORT};
use standin_http::engine::{Engine, RuleSet};
use standin_http::server::{bind_with_retry, BindRetry, ServerError, StandinServer};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rule-driven HTTP stand-in for test suites
#[derive(Parser, Debug)]
#[command(name = "standin")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Rule file (JSON, or YAML with a .yaml/.yml extension) [default: baseConfig.json]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Print the listening address once bound
    #[arg(short, long)]
    verbose: bool,

    /// Print "Ready!" once bound
    #[arg(short = 'r', long)]
    ready_mode: bool,

    /// Log loaded rules and the rule picked for each request (implies --verbose)
    #[arg(long)]
    trace: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            port: args.port,
            rules_path: args.config,
            verbose: args.verbose || args.trace,
            ready_mode: args.ready_mode,
            trace: args.trace,
        }
    }
}

fn init_tracing(config: &ServerConfig) {
    let default_level = if config.trace {
        "standin_http=debug"
    } else if config.verbose {
        "standin_http=info"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config: ServerConfig = Args::parse().into();
    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(ServerError::AddressInUse { .. }) = e.downcast_ref::<ServerError>() {
                eprintln!("Address in use, giving up");
                return ExitCode::from(2);
            }
            if let Some(missing @ ConfigError::Missing(_)) = e.downcast_ref::<ConfigError>() {
                eprintln!("{}", missing);
                return ExitCode::FAILURE;
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    debug!("Starting with {:?}", config);
    let rules = config.load_rules()?;
    debug!("Loaded rules from {}: {:#?}", config.rules_source(), rules);

    let rule_set = RuleSet::compile(rules)?;
    let server = Arc::new(StandinServer::new(Engine::with_stdout(rule_set)));

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = bind_with_retry(addr, BindRetry::default()).await?;

    if config.verbose {
        println!("Server listening on {}", addr);
    }
    if config.ready_mode {
        println!("Ready!");
    }

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run(listener).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    server.shutdown();

    serving.await.context("Server task panicked")??;
    Ok(())
}
