//! Serve the advisor relay, or run a single prompt to the console.
//!
//!   advisor-relay --config relay.toml
//!   advisor-relay --script demo.json --once "Analyse fund 000001"
//!   RUST_LOG=debug advisor-relay --remote-url http://localhost:8080

use std::path::PathBuf;
use std::sync::Arc;

use advisor_relay::{
    invoke_agent, router, AgentSource, AppState, ConsoleSink, Dispatcher, InvocationContext,
    LoggingSink, RelayConfig,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "advisor-relay", about = "Relay advisory agent events to clients")]
struct Cli {
    /// TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<String>,

    /// Replay this script instead of the configured agent
    #[arg(long, conflicts_with = "remote_url")]
    script: Option<PathBuf>,

    /// Invoke the agent hosted at this URL
    #[arg(long)]
    remote_url: Option<String>,

    /// Delay between scripted steps, in milliseconds
    #[arg(long)]
    pace_ms: Option<u64>,

    /// Run one prompt, print the reply as it streams, and exit
    #[arg(long)]
    once: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut RelayConfig) {
        if let Some(ref bind) = self.bind {
            config.bind = bind.clone();
        }
        if let Some(ref path) = self.script {
            config.agent = AgentSource::Scripted {
                path: path.clone(),
                pace_ms: 0,
            };
        }
        if let Some(ref url) = self.remote_url {
            config.agent = AgentSource::Remote {
                url: url.clone(),
                api_key_env: None,
            };
        }
        if let Some(pace) = self.pace_ms {
            match config.agent {
                AgentSource::Demo { ref mut pace_ms } | AgentSource::Scripted { ref mut pace_ms, .. } => {
                    *pace_ms = pace;
                }
                AgentSource::Remote { .. } => {}
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => RelayConfig::load(path).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        }),
        None => RelayConfig::default(),
    };
    cli.apply(&mut config);

    if let Some(ref prompt) = cli.once {
        run_once(&config, prompt).await;
        return;
    }

    let state = AppState::from_config(&config).await.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .unwrap_or_else(|e| {
            eprintln!("error: cannot bind {}: {e}", config.bind);
            std::process::exit(1);
        });
    info!(bind = %config.bind, agent = %config.agent_name, "advisor relay listening");

    if let Err(e) = axum::serve(listener, router(Arc::new(state))).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run_once(config: &RelayConfig, prompt: &str) {
    let agent = config.build_agent().await.unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    let dispatcher = Dispatcher::new(config.agent_name.as_str())
        .with_decoder(config.decoder())
        .with_sink(ConsoleSink::stdout())
        .with_sink(LoggingSink::new(config.agent_name.as_str()));
    let ctx = InvocationContext::new(Arc::new(dispatcher), CancellationToken::new());

    let cancel = ctx.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    if let Err(e) = invoke_agent(agent.as_ref(), prompt, &ctx).await {
        eprintln!("\nerror: {e}");
        std::process::exit(1);
    }
}
