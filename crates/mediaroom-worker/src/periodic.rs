//! Interval-driven background jobs with cooperative shutdown.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counters reported by one job pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, ok: bool) {
        self.attempted += 1;
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// A unit of background work executed once per tick.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run a single pass. Implementations check `cancel` between items and
    /// return early once it fires; the item in flight is allowed to finish.
    async fn run_once(&self, cancel: &CancellationToken) -> anyhow::Result<RunSummary>;
}

/// Handle to a spawned periodic job.
pub struct PeriodicWorker {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicWorker {
    /// Spawn `job`, running it immediately and then every `every`.
    ///
    /// The worker stops when `parent` is cancelled or [`shutdown`](Self::shutdown)
    /// is called.
    pub fn start(job: Arc<dyn PeriodicJob>, every: Duration, parent: &CancellationToken) -> Self {
        let name = job.name();
        let token = parent.child_token();
        let every = every.max(Duration::from_millis(1));
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(
                job = name,
                interval_secs = every.as_secs_f64(),
                "Periodic worker started"
            );

            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let start = Instant::now();
                match job.run_once(&loop_token).await {
                    Ok(summary) => {
                        tracing::info!(
                            job = name,
                            attempted = summary.attempted,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                            "Periodic run completed"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            job = name,
                            error = %format!("{:#}", e),
                            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                            "Periodic run failed"
                        );
                    }
                }
            }

            tracing::info!(job = name, "Periodic worker stopped");
        });

        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the worker and wait for the current pass to wind down.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(job = self.name, error = %e, "Periodic worker task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PeriodicJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self, _cancel: &CancellationToken) -> anyhow::Result<RunSummary> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(RunSummary::default())
        }
    }

    async fn wait_for_runs(job: &CountingJob, at_least: usize) {
        for _ in 0..200 {
            if job.runs.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job ran fewer than {} times", at_least);
    }

    #[tokio::test]
    async fn test_runs_immediately_and_stops_on_shutdown() {
        let job = Arc::new(CountingJob::default());
        let root = CancellationToken::new();
        let worker = PeriodicWorker::start(job.clone(), Duration::from_secs(3600), &root);

        wait_for_runs(&job, 1).await;
        worker.shutdown().await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_keeps_ticking_after_failed_run() {
        let job = Arc::new(CountingJob {
            fail: true,
            ..Default::default()
        });
        let root = CancellationToken::new();
        let worker = PeriodicWorker::start(job.clone(), Duration::from_millis(10), &root);

        wait_for_runs(&job, 3).await;
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_worker() {
        let job = Arc::new(CountingJob::default());
        let root = CancellationToken::new();
        let worker = PeriodicWorker::start(job.clone(), Duration::from_secs(3600), &root);
        wait_for_runs(&job, 1).await;

        root.cancel();
        for _ in 0..200 {
            if worker.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(worker.is_finished());
    }

    #[test]
    fn test_summary_record_and_merge() {
        let mut a = RunSummary::default();
        a.record(true);
        a.record(false);
        let mut b = RunSummary::default();
        b.record(true);
        a.merge(b);

        assert_eq!(
            a,
            RunSummary {
                attempted: 3,
                succeeded: 2,
                failed: 1
            }
        );
    }
}
