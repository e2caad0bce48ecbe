//! Cron-style maintenance jobs using tokio-cron-scheduler.

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use xbrl_infra::CsrfGuard;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Enable scheduler.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

/// Cron job scheduler wrapper.
pub struct Scheduler {
    inner: JobScheduler,
    config: SchedulerConfig,
}

impl Scheduler {
    pub async fn new(config: SchedulerConfig) -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner, config })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Add a cron job (six fields, seconds first).
    pub async fn add_cron<F, Fut>(
        &self,
        schedule: &str,
        task: F,
    ) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return Ok(());
        }

        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

/// Register the periodic purge of expired CSRF tokens.
pub async fn register_cleanup_jobs(
    scheduler: &Scheduler,
    schedule: &str,
    csrf: Arc<CsrfGuard>,
) -> Result<(), JobSchedulerError> {
    if !scheduler.is_enabled() {
        return Ok(());
    }

    scheduler
        .add_cron(schedule, move || {
            let csrf = csrf.clone();
            async move {
                match csrf.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Purged expired CSRF tokens"),
                    Err(e) => tracing::error!(error = %e, "CSRF token cleanup failed"),
                }
            }
        })
        .await?;
    Ok(())
}
