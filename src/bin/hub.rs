use clap::{Parser, Subcommand};
use system_monitor::{
    collector::SysinfoProbe,
    config::{Config, read_config_file},
    engine::{Engine, MonitorContext},
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); environment variables override its values
    #[arg(short, long)]
    file: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the background engine until Ctrl-C (default)
    Run,
    /// Evaluate all active alert rules once
    CheckAlerts,
    /// Send a test notification for a rule through one channel
    TestAlert {
        #[arg(long)]
        rule_id: i64,
        /// email, sms or slack
        #[arg(long, default_value = "email")]
        channel: String,
    },
    /// Delete data older than the retention period
    Sweep,
    /// Probe all monitored services that are due
    Health,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("system_monitor", level),
        ("hub", level),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(file: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    config.apply_env()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = load_config(args.file.as_deref())?;
    debug!("loaded config: {config:?}");

    let context = MonitorContext::from_config(config).await?;
    let probe = SysinfoProbe::new(context.config.temperature_sensors.clone());
    let engine = Engine::new(context, probe)?;
    let local = engine.bootstrap().await?;
    debug!(id = local.id, "local server ready");

    let result = run_command(&engine, args.command.unwrap_or(Command::Run)).await;

    engine.context.storage.close().await?;
    result
}

async fn run_command(engine: &Engine<SysinfoProbe>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run => {
            let mut scheduler = engine.build_scheduler()?;
            scheduler.start();
            info!("monitoring engine running, press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            scheduler.shutdown().await;
        }
        Command::CheckAlerts => {
            let report = engine.evaluator.check_and_notify_alerts().await;
            println!(
                "checked {} rules: {} alerts created, {} suppressed, {} failed",
                report.rules_checked, report.alerts_created, report.suppressed, report.failed_rules
            );
        }
        Command::TestAlert { rule_id, channel } => {
            let (success, message) = engine
                .evaluator
                .test_alert_notification(rule_id, &channel)
                .await;
            println!("{message}");
            if !success {
                anyhow::bail!("test notification failed");
            }
        }
        Command::Sweep => {
            let report = engine.sweeper.sweep().await?;
            println!("deleted {} rows", report.total());
        }
        Command::Health => {
            let report = engine.health.run_health_checks().await;
            println!(
                "checked {} services: {} up, {} down",
                report.checked, report.up, report.down
            );
        }
    }
    Ok(())
}
