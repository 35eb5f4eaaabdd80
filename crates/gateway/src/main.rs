use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vsm_domain::config::{ConfigSeverity, GatewayConfig};

#[derive(Debug, Parser)]
#[command(name = "analemma-vsm", version, about = "Analemma Bridge VSM governance gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to a TOML config file. Defaults to $VSM_CONFIG or config.toml.
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Validate the current configuration and exit non-zero on errors.
    ConfigValidate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(config_path.as_deref())?;
            run_server(config).await
        }
        Some(Command::ConfigValidate) => {
            let config = load_config(config_path.as_deref())?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn resolve_config_path(explicit: Option<&str>) -> Option<String> {
    explicit.map(str::to_string).or_else(|| std::env::var("VSM_CONFIG").ok())
}

fn load_config(path: Option<&str>) -> anyhow::Result<GatewayConfig> {
    let path = path.unwrap_or("config.toml");
    let path = std::path::Path::new(path);
    let config = if path.exists() {
        GatewayConfig::load(Some(path))?
    } else {
        GatewayConfig::load(None)?
    };
    Ok(config)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vsm_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    tracing::info!("analemma-vsm starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = vsm_gateway::build_state(config).await;
    tracing::info!(
        audit_backend = state.audit.backend_name(),
        policy_version = %state.policy_version,
        "governance state ready"
    );

    let app = vsm_gateway::app(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
