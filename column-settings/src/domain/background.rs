//! Owner of best-effort delayed reconciliation tasks.
//!
//! Each task sleeps for its delay, runs once, and logs its outcome. Nothing
//! is retried and nothing is surfaced to the caller that scheduled it.
//! Dropping the scheduler aborts whatever is still pending.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use super::SettingsSleeper;

/// Runs delayed one-shot tasks on the Tokio runtime.
pub struct BackgroundScheduler {
    sleeper: Arc<dyn SettingsSleeper>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundScheduler {
    /// Build a scheduler that waits through `sleeper`.
    pub fn new(sleeper: Arc<dyn SettingsSleeper>) -> Self {
        Self {
            sleeper,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Run `task` once after `delay`, logging its outcome under `label`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, E>(&self, label: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let sleeper = Arc::clone(&self.sleeper);
        let Ok(mut tasks) = self.tasks.lock() else {
            warn!(task = label, "background scheduler poisoned; task dropped");
            return;
        };
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            sleeper.sleep(delay).await;
            match task.await {
                Ok(()) => info!(task = label, "background task completed"),
                Err(error) => warn!(task = label, error = %error, "background task failed"),
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or(0)
    }

    /// Wait for every scheduled task, including ones scheduled meanwhile.
    pub async fn shutdown(&self) {
        loop {
            let mut drained = match self.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => return,
            };
            if drained.is_empty() {
                return;
            }
            while let Some(joined) = drained.join_next().await {
                if let Err(error) = joined {
                    warn!(error = %error, "background task aborted or panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokioSleeper;
    use crate::test_support::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn tasks_run_once_after_their_delay() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let scheduler = BackgroundScheduler::new(sleeper.clone());
        let runs = Arc::new(AtomicU32::new(0));

        for delay in [Duration::from_secs(5), Duration::from_secs(2)] {
            let runs = Arc::clone(&runs);
            scheduler.schedule("count", delay, async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<(), String>(())
            });
        }
        scheduler.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        let mut delays = sleeper.recorded();
        delays.sort();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(5)]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn failures_and_panics_are_contained() {
        let scheduler = BackgroundScheduler::new(Arc::new(RecordingSleeper::default()));

        scheduler.schedule("fails", Duration::ZERO, async {
            Err::<(), String>("backend down".to_owned())
        });
        let explode = Arc::new(AtomicU32::new(1));
        scheduler.schedule("panics", Duration::ZERO, async move {
            if explode.load(Ordering::SeqCst) == 1 {
                panic!("task blew up");
            }
            Ok::<(), String>(())
        });

        scheduler.shutdown().await;
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_scheduler_aborts_pending_tasks() {
        let scheduler = BackgroundScheduler::new(Arc::new(TokioSleeper));
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        scheduler.schedule("late", Duration::from_secs(30), async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        });

        drop(scheduler);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
