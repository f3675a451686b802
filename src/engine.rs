//! Wiring of the background engine
//!
//! [`MonitorContext`] carries everything a job needs (configuration, store
//! and notification channels) and is handed explicitly to each component.
//! [`Engine::build_scheduler`] registers the four periodic jobs.

use std::sync::Arc;

use anyhow::Context;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{info, instrument, warn};

use crate::alerts::AlertEvaluator;
use crate::collector::{HostProbe, MetricCollector};
use crate::config::{Config, StorageConfig};
use crate::health::HealthChecker;
use crate::notify::Dispatcher;
use crate::retention::RetentionSweeper;
use crate::scheduler::{Schedule, Scheduler, SchedulerError};
use crate::storage::memory::MemoryBackend;
use crate::storage::{NewServer, Server, StorageBackend};

pub const COLLECT_METRICS_JOB: &str = "collect_metrics";
pub const CHECK_ALERTS_JOB: &str = "check_alerts";
pub const CLEANUP_JOB: &str = "cleanup_old_data";
pub const HEALTH_CHECKS_JOB: &str = "health_checks";

/// Local time of the daily retention sweep
pub const CLEANUP_AT: Schedule = Schedule::DailyAt { hour: 2, minute: 0 };

pub const LOCAL_SERVER_NAME: &str = "Local Server";

const API_KEY_LEN: usize = 43;

pub struct MonitorContext {
    pub config: Config,
    pub storage: Arc<dyn StorageBackend>,
    pub dispatcher: Arc<Dispatcher>,
}

impl MonitorContext {
    pub fn new(config: Config, storage: Arc<dyn StorageBackend>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            storage,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Open the configured store and build all channels from `config`
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let storage = open_storage(&config.storage).await?;
        let dispatcher = Dispatcher::from_config(&config);
        Ok(Self::new(config, storage, dispatcher))
    }
}

pub async fn open_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::None => {
            warn!("no persistent storage configured, metrics are kept in memory only");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = crate::storage::sqlite::SqliteBackend::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            info!("using SQLite database at {}", path.display());
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("SQLite storage requested but the storage-sqlite feature is disabled")
        }
    }
}

pub fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Return the local server, creating it on first start
#[instrument(skip(storage))]
pub async fn ensure_local_server(storage: &dyn StorageBackend) -> anyhow::Result<Server> {
    if let Some(server) = storage
        .local_server()
        .await
        .context("failed to look up local server")?
    {
        return Ok(server);
    }

    let created = storage
        .insert_server(NewServer {
            name: LOCAL_SERVER_NAME.to_string(),
            hostname: "localhost".to_string(),
            api_key: generate_api_key(),
            is_local: true,
            is_active: true,
        })
        .await;

    match created {
        Ok(server) => {
            info!(id = server.id, "registered local server");
            Ok(server)
        }
        // another process may have created it in between
        Err(e) => storage
            .local_server()
            .await
            .context("failed to look up local server")?
            .with_context(|| format!("failed to create local server: {e}")),
    }
}

pub struct Engine<P: HostProbe> {
    pub context: Arc<MonitorContext>,
    pub collector: MetricCollector<P>,
    pub evaluator: Arc<AlertEvaluator>,
    pub health: Arc<HealthChecker>,
    pub sweeper: Arc<RetentionSweeper>,
}

impl<P: HostProbe> Engine<P> {
    pub fn new(context: MonitorContext, probe: P) -> anyhow::Result<Self> {
        let config = &context.config;

        let collector = MetricCollector::new(
            context.storage.clone(),
            probe,
            config.process_snapshot_limit,
        );
        let evaluator = AlertEvaluator::new(context.storage.clone(), context.dispatcher.clone());
        let health = HealthChecker::new(context.storage.clone(), config.health_check_concurrency)?;
        let sweeper = RetentionSweeper::new(
            context.storage.clone(),
            config.data_retention_days,
            config.alert_retention_days,
        );

        Ok(Self {
            context: Arc::new(context),
            collector,
            evaluator: Arc::new(evaluator),
            health: Arc::new(health),
            sweeper: Arc::new(sweeper),
        })
    }

    pub async fn bootstrap(&self) -> anyhow::Result<Server> {
        ensure_local_server(self.context.storage.as_ref()).await
    }

    /// Scheduler with all engine jobs registered, not yet started
    pub fn build_scheduler(&self) -> Result<Scheduler, SchedulerError> {
        let config = &self.context.config;
        let mut scheduler = Scheduler::new();

        let collector = self.collector.clone();
        scheduler.register(
            COLLECT_METRICS_JOB,
            Schedule::Interval(config.collection_interval()),
            move || {
                let collector = collector.clone();
                async move {
                    collector.collect_tick().await;
                    anyhow::Ok(())
                }
            },
        )?;

        let evaluator = self.evaluator.clone();
        scheduler.register(
            CHECK_ALERTS_JOB,
            Schedule::Interval(config.alert_interval()),
            move || {
                let evaluator = evaluator.clone();
                async move {
                    evaluator.check_and_notify_alerts().await;
                    anyhow::Ok(())
                }
            },
        )?;

        let sweeper = self.sweeper.clone();
        scheduler.register(CLEANUP_JOB, CLEANUP_AT, move || {
            let sweeper = sweeper.clone();
            async move { sweeper.sweep().await.map(|_| ()) }
        })?;

        let health = self.health.clone();
        scheduler.register(
            HEALTH_CHECKS_JOB,
            Schedule::Interval(config.health_interval()),
            move || {
                let health = health.clone();
                async move {
                    health.run_health_checks().await;
                    anyhow::Ok(())
                }
            },
        )?;

        Ok(scheduler)
    }
}
