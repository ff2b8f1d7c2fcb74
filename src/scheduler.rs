use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::Result;

/// A background role that runs for the lifetime of the database: the
/// tiny-batch ticker, the sync stage, the time-mark expirer.
#[async_trait::async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Task name for logging.
    fn name(&self) -> &'static str;

    /// How often to run this task.
    fn interval(&self) -> Duration;

    /// One tick of the task. Errors are logged, not fatal: the next tick
    /// runs regardless.
    async fn execute(&self) -> Result<()>;
}

/// Drives registered background tasks on their intervals and stops them
/// together on shutdown.
pub struct Scheduler {
    tasks: RwLock<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tasks: RwLock::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Registers a periodic background task.
    pub fn register<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> &Self {
        let handle = self.spawn_timer_loop(task);
        self.tasks.write().unwrap().push(handle);
        self
    }

    fn spawn_timer_loop<T: BackgroundTask + 'static>(&self, task: Arc<T>) -> JoinHandle<()> {
        let interval = task.interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = task.execute().await {
                            tracing::error!(
                                task = task.name(),
                                error = %e,
                                "background task failed"
                            );
                        }
                    }

                    _ = shutdown_rx.recv() => {
                        tracing::debug!(task = task.name(), "background task shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Signals every task to stop and waits for them to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).ok();

        let tasks: Vec<_> = self.tasks.write().unwrap().drain(..).collect();
        for task in tasks {
            task.await
                .map_err(|e| crate::Error::InvalidState(format!("task join error: {e}")))?;
        }

        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TickCounter {
        interval: Duration,
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl BackgroundTask for TickCounter {
        fn name(&self) -> &'static str {
            "tick-counter"
        }

        fn interval(&self) -> Duration {
            self.interval
        }

        async fn execute(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_task_runs_on_interval() -> Result<()> {
        let scheduler = Scheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        scheduler.register(Arc::new(TickCounter {
            interval: Duration::from_millis(10),
            ticks: ticks.clone(),
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ticks.load(Ordering::SeqCst) > 0);

        scheduler.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_no_ticks_after_shutdown() -> Result<()> {
        let scheduler = Scheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        scheduler.register(Arc::new(TickCounter {
            interval: Duration::from_millis(10),
            ticks: ticks.clone(),
        }));

        tokio::time::sleep(Duration::from_millis(25)).await;
        scheduler.shutdown().await?;
        let after_shutdown = ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(after_shutdown, ticks.load(Ordering::SeqCst));

        Ok(())
    }
}
