//! Fixed-interval tick driver.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Default tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Fires a callback on a fixed interval until stopped.
///
/// Ticks never overlap: the next tick waits until the current callback has
/// finished, and ticks missed while a callback ran are delayed rather than
/// fired in a burst. The first tick fires immediately.
///
/// Dropping the scheduler stops it without waiting; call [`Scheduler::stop`]
/// to also wait for an in-flight tick.
///
/// # Example
///
/// ```rust,no_run
/// use heartwatch_sdk::Scheduler;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let mut scheduler = Scheduler::start(Duration::from_secs(1), || async {
///         println!("tick");
///     });
///
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     scheduler.stop().await;
/// }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Scheduler {
    /// Start firing `on_tick` every `interval`.
    ///
    /// A zero interval is raised to one millisecond.
    pub fn start<F, Fut>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => on_tick().await,
                }
            }
        });

        Self {
            stop_tx,
            task: Some(task),
            interval,
        }
    }

    /// Stop ticking and wait for an in-flight tick to finish.
    ///
    /// Safe to call more than once.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("Scheduler tick panicked: {}", e);
                }
            }
        }
    }

    /// Returns true until the scheduler has been stopped.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// The interval between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
