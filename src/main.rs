use agent_monitor::application::*;
use agent_monitor::Config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agent-monitor")]
#[command(about = "Observability pipeline for analytics agents: health, alerts and cost optimization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the flush worker and alert evaluation loop until interrupted
    Serve,
    /// Show per-agent health scores
    Health {
        /// Restrict to one agent type (e.g. content_analysis)
        #[arg(long)]
        agent: Option<String>,
        /// Trailing window in minutes
        #[arg(long, default_value_t = 5)]
        window: i64,
    },
    /// Show system aggregates, agent health and open alert counts
    Realtime {
        #[arg(long, default_value_t = 5)]
        window: i64,
    },
    /// List alerts, newest first
    Alerts {
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        /// Only alerts nobody has acknowledged yet
        #[arg(long)]
        unacknowledged: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Acknowledge an alert
    Ack {
        id: Uuid,
        #[arg(long, env = "USER")]
        actor: String,
    },
    /// Resolve an alert
    Resolve {
        id: Uuid,
        #[arg(long, env = "USER")]
        actor: String,
    },
    /// List alert rules
    Rules,
    /// Run one alert evaluation cycle now
    Evaluate,
    /// Analyze agent costs over a trailing window
    Costs {
        /// Trailing window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Generate cost optimization recommendations
    Recommendations {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Create the database and apply the metric schema
    SetupDb,
    /// Print pipeline self-metrics in Prometheus text format
    Metrics,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.operational.log_level));

    // Logs go to stderr so command output on stdout stays parseable
    if config.operational.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(&config);

    // Schema bootstrap runs before the store is usable
    if let Some(Commands::SetupDb) = cli.command {
        let handler = DatabaseCommandHandler::new(config.storage.database_url.clone());
        handler.setup().await?;
        return handler.check_health().await;
    }

    let app = Application::from_config(config).await?;
    app.initialize().await?;

    match cli.command {
        Some(Commands::Serve) | None => {
            let handler = ServerCommandHandler::new(app.service.clone(), app.lifecycle.clone());
            handler.run_server().await
        }
        Some(Commands::Health { agent, window }) => {
            let handler = HealthCommandHandler::new(app.service.clone());
            handler.run_health_check(agent.as_deref(), window).await
        }
        Some(Commands::Realtime { window }) => {
            let handler = HealthCommandHandler::new(app.service.clone());
            handler.show_realtime(window).await
        }
        Some(Commands::Alerts {
            severity,
            agent,
            unacknowledged,
            limit,
        }) => {
            let handler = AlertCommandHandler::new(app.service.clone());
            handler
                .list_alerts(severity.as_deref(), agent.as_deref(), unacknowledged, limit)
                .await
        }
        Some(Commands::Ack { id, actor }) => {
            let handler = AlertCommandHandler::new(app.service.clone());
            handler.acknowledge(id, &actor).await
        }
        Some(Commands::Resolve { id, actor }) => {
            let handler = AlertCommandHandler::new(app.service.clone());
            handler.resolve(id, &actor).await
        }
        Some(Commands::Rules) => AlertCommandHandler::new(app.service.clone()).list_rules().await,
        Some(Commands::Evaluate) => {
            AlertCommandHandler::new(app.service.clone())
                .evaluate_once()
                .await
        }
        Some(Commands::Costs { hours }) => {
            CostCommandHandler::new(app.service.clone())
                .analyze(hours)
                .await
        }
        Some(Commands::Recommendations { hours }) => {
            CostCommandHandler::new(app.service.clone())
                .recommend(hours)
                .await
        }
        Some(Commands::Metrics) => MetricsCommandHandler::new(app.service.clone()).print_metrics(),
        Some(Commands::SetupDb) => Ok(()),
    }
}
