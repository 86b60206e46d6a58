//! Task host collaborator
//!
//! The pool does not spawn workers directly; it hands their bodies to a
//! [`TaskHost`], which owns scheduling, restart policy and backoff for
//! long-lived background tasks running under a root lifetime.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::BoxError;

/// Future produced by one invocation of a task function.
pub type TaskFuture = BoxFuture<'static, Result<(), BoxError>>;

/// A restartable task body. The host invokes it once per attempt, passing a
/// child token of the root lifetime that is cancelled when the root ends.
pub type TaskFn = Box<dyn FnMut(CancellationToken) -> TaskFuture + Send>;

/// Restart behavior requested for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    /// Run the task once, whatever the outcome.
    Never,
    /// Restart only when the task returns an error.
    OnFailure,
    /// Restart until the root lifetime ends.
    Always,
}

/// Exponential backoff between task restarts.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use workpool::TaskBackoff;
///
/// let backoff = TaskBackoff::default()
///     .with_initial_interval(Duration::from_millis(100))
///     .with_max_interval(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskBackoff {
    /// Delay before the first restart.
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Cap on the delay between restarts.
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Growth factor applied per restart (e.g. 2.0 for doubling).
    pub multiplier: f64,

    /// Jitter factor (0.0-1.0) to add randomness.
    pub jitter: f64,
}

impl Default for TaskBackoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl TaskBackoff {
    /// Set the delay before the first restart.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the cap on the delay between restarts.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the jitter factor (0.0-1.0).
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the given attempt number (1-based; the first attempt has
    /// no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let restart = attempt - 1;
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(restart as i32 - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 && capped > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped * self.jitter;
            let jitter_offset = rng.gen_range(-jitter_range..jitter_range);
            (capped + jitter_offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

/// Configuration of a long-lived background task.
pub struct TaskConfig {
    /// Identifier used in logs. The pool passes its own name.
    pub id: String,

    /// Root lifetime; its end is a hard stop for the task and its restarts.
    pub cancellation: CancellationToken,

    /// The task body factory.
    pub func: TaskFn,

    /// Whether the host restarts the task after it returns.
    pub restart: RestartPolicy,

    /// Backoff applied between restarts.
    pub backoff: TaskBackoff,
}

/// Spawns and supervises long-lived background tasks.
pub trait TaskHost: Send + Sync + 'static {
    fn start_task(&self, config: TaskConfig);
}

/// Task host backed by `tokio::spawn`.
///
/// Each task runs a supervision loop: invoke the body with a child token of
/// the root, then restart it according to the configured policy, sleeping
/// the backoff delay between attempts. Root cancellation short-circuits both
/// the sleep and any further attempts.
///
/// # Panics
///
/// `start_task` panics if called outside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskHost;

impl TokioTaskHost {
    pub fn new() -> Self {
        Self
    }
}

impl TaskHost for TokioTaskHost {
    fn start_task(&self, mut config: TaskConfig) {
        tokio::spawn(async move {
            let mut attempt: u32 = 0;

            loop {
                if config.cancellation.is_cancelled() {
                    break;
                }

                attempt += 1;
                let result = (config.func)(config.cancellation.child_token()).await;

                match &result {
                    Ok(()) => debug!(task = %config.id, attempt, "task finished"),
                    Err(error) => debug!(task = %config.id, attempt, %error, "task failed"),
                }

                let restart = match config.restart {
                    RestartPolicy::Never => false,
                    RestartPolicy::OnFailure => result.is_err(),
                    RestartPolicy::Always => true,
                };
                if !restart {
                    break;
                }

                let delay = config.backoff.delay_for_attempt(attempt + 1);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = config.cancellation.cancelled() => break,
                }
            }
        });
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use futures::FutureExt;

    use super::*;

    #[test]
    fn test_backoff_defaults() {
        let backoff = TaskBackoff::default();
        assert_eq!(backoff.initial_interval, Duration::from_secs(1));
        assert_eq!(backoff.max_interval, Duration::from_secs(60));
        assert_eq!(backoff.multiplier, 2.0);
    }

    #[test]
    fn test_delay_for_attempt_grows() {
        let backoff = TaskBackoff::default().with_jitter(0.0);

        assert_eq!(backoff.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max_interval() {
        let backoff = TaskBackoff::default()
            .with_max_interval(Duration::from_secs(5))
            .with_jitter(0.0);

        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_serialization() {
        let backoff = TaskBackoff::default().with_initial_interval(Duration::from_millis(250));

        let json = serde_json::to_string(&backoff).unwrap();
        let parsed: TaskBackoff = serde_json::from_str(&json).unwrap();

        assert_eq!(backoff, parsed);
    }

    fn counting_task(runs: Arc<AtomicU32>, fail_first: u32) -> TaskFn {
        Box::new(move |_cancellation| {
            let runs = Arc::clone(&runs);
            async move {
                let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                if run <= fail_first {
                    Err("boom".into())
                } else {
                    Ok(())
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_restart_never_runs_once() {
        let runs = Arc::new(AtomicU32::new(0));

        TokioTaskHost::new().start_task(TaskConfig {
            id: "test".to_string(),
            cancellation: CancellationToken::new(),
            func: counting_task(Arc::clone(&runs), u32::MAX),
            restart: RestartPolicy::Never,
            backoff: TaskBackoff::default().with_initial_interval(Duration::from_millis(1)),
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_on_failure_until_success() {
        let runs = Arc::new(AtomicU32::new(0));

        TokioTaskHost::new().start_task(TaskConfig {
            id: "test".to_string(),
            cancellation: CancellationToken::new(),
            func: counting_task(Arc::clone(&runs), 2),
            restart: RestartPolicy::OnFailure,
            backoff: TaskBackoff::default()
                .with_initial_interval(Duration::from_millis(1))
                .with_jitter(0.0),
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_root_cancellation_stops_restarts() {
        let runs = Arc::new(AtomicU32::new(0));
        let root = CancellationToken::new();

        TokioTaskHost::new().start_task(TaskConfig {
            id: "test".to_string(),
            cancellation: root.clone(),
            func: counting_task(Arc::clone(&runs), u32::MAX),
            restart: RestartPolicy::Always,
            backoff: TaskBackoff::default().with_initial_interval(Duration::from_secs(60)),
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        root.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One attempt ran; the backoff sleep was interrupted by the root.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
