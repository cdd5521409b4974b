//! Background job runner
//!
//! Fire-and-forget work (background analysis, partial-result salvage,
//! document import) runs as a `Job` on the tokio runtime. Each job gets
//! its own `JobContext` built from cloned handles, so nothing borrowed
//! from the submitting request outlives it. Failures are logged and
//! swallowed.

use crate::config::AppConfig;
use crate::db::{DbPool, Repository};
use crate::errors::Result;
use crate::llm::ChatClientFactory;
use crate::metrics;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{error, info, Instrument};

/// Handles available to a running job
#[derive(Clone)]
pub struct JobContext {
    pub repo: Repository,
    pub llm: Arc<dyn ChatClientFactory>,
    pub config: Arc<AppConfig>,
}

/// A unit of background work
#[async_trait]
pub trait Job: Send + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, ctx: JobContext) -> Result<()>;
}

/// Spawns jobs and tracks how many are still running
#[derive(Clone)]
pub struct JobRunner {
    pool: DbPool,
    llm: Arc<dyn ChatClientFactory>,
    config: Arc<AppConfig>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl JobRunner {
    pub fn new(pool: DbPool, llm: Arc<dyn ChatClientFactory>, config: Arc<AppConfig>) -> Self {
        Self {
            pool,
            llm,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Context for work that runs outside the runner, e.g. request handlers
    pub fn context(&self) -> JobContext {
        JobContext {
            repo: Repository::new(self.pool.clone()),
            llm: self.llm.clone(),
            config: self.config.clone(),
        }
    }

    /// Spawn a job; returns immediately
    pub fn submit<J: Job>(&self, job: J) {
        let name = job.name();
        let ctx = self.context();
        let tracker = InFlight::enter(self.in_flight.clone(), self.idle.clone());
        let span = tracing::info_span!("job", job = name);

        tokio::spawn(
            async move {
                let _tracker = tracker;
                let start = Instant::now();

                match Box::new(job).run(ctx).await {
                    Ok(()) => info!(elapsed_ms = start.elapsed().as_millis() as u64, "Job finished"),
                    Err(e) => error!(error = %e, elapsed_ms = start.elapsed().as_millis() as u64, "Job failed"),
                }
            }
            .instrument(span),
        );
    }

    /// Number of jobs not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve once no job is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts a job as running until dropped, even if the job panics
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl InFlight {
    fn enter(count: Arc<AtomicUsize>, idle: Arc<Notify>) -> Self {
        let now = count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_jobs_in_flight(now);
        Self { count, idle }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let now = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_jobs_in_flight(now);
        if now == 0 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::llm::ScriptedChatFactory;
    use std::time::Duration;

    struct Sleepy {
        done: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for Sleepy {
        fn name(&self) -> &'static str {
            "sleepy"
        }

        async fn run(self: Box<Self>, _ctx: JobContext) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Job for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(self: Box<Self>, _ctx: JobContext) -> Result<()> {
            Err(AppError::Internal { message: "nope".into() })
        }
    }

    async fn runner() -> JobRunner {
        let config = Arc::new(AppConfig::for_tests());
        let pool = DbPool::new(&config.database).await.unwrap();
        JobRunner::new(pool, Arc::new(ScriptedChatFactory::default()), config)
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_all_jobs() {
        let runner = runner().await;
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            runner.submit(Sleepy { done: done.clone() });
        }
        runner.submit(Failing);

        runner.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(runner.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_empty() {
        let runner = runner().await;
        tokio::time::timeout(Duration::from_millis(100), runner.wait_idle())
            .await
            .unwrap();
    }
}
