//! Worker pool configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Consecutive quiet time after which an idle worker above the floor retires.
pub const DEFAULT_WORKER_IDLE_TIMEOUT: Duration = Duration::from_millis(128);

/// How long a publisher waits on a full queue before dropping the item.
pub const DEFAULT_WORKER_BUSY_TIMEOUT: Duration = Duration::from_millis(64);

/// Worker pool configuration
///
/// All bounds are coerced at construction time: non-positive worker counts
/// become 1, a negative queue size becomes 0, a ceiling below the floor is
/// raised to it, and zero timeouts take the defaults.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use workpool::PoolConfig;
///
/// let config = PoolConfig::new("uplinks")
///     .with_min_workers(2)
///     .with_max_workers(16)
///     .with_queue_size(64)
///     .with_worker_idle_timeout(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Pool name, used as the metrics and tracing label.
    pub name: String,

    /// Floor enforced by retirement: idle workers never retire below it.
    pub min_workers: i32,

    /// Ceiling enforced by spawning: the population never exceeds it.
    pub max_workers: i32,

    /// Queue capacity. Zero means direct handoff: every push needs a worker
    /// ready to receive immediately.
    pub queue_size: i32,

    /// Consecutive quiet time after which a worker tries to retire.
    #[serde(with = "duration_millis")]
    pub worker_idle_timeout: Duration,

    /// Publisher patience after a spawn attempt, before the item is dropped.
    #[serde(with = "duration_millis")]
    pub worker_busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            min_workers: 1,
            max_workers: 1,
            queue_size: 0,
            worker_idle_timeout: DEFAULT_WORKER_IDLE_TIMEOUT,
            worker_busy_timeout: DEFAULT_WORKER_BUSY_TIMEOUT,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given pool name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the worker floor.
    pub fn with_min_workers(mut self, min: i32) -> Self {
        self.min_workers = min;
        self
    }

    /// Set the worker ceiling.
    pub fn with_max_workers(mut self, max: i32) -> Self {
        self.max_workers = max;
        self
    }

    /// Set the queue capacity.
    pub fn with_queue_size(mut self, size: i32) -> Self {
        self.queue_size = size;
        self
    }

    /// Set the idle timeout.
    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    /// Set the busy timeout.
    pub fn with_worker_busy_timeout(mut self, timeout: Duration) -> Self {
        self.worker_busy_timeout = timeout;
        self
    }

    /// Apply the construction-time coercions.
    pub(crate) fn normalized(mut self) -> Self {
        if self.worker_busy_timeout.is_zero() {
            self.worker_busy_timeout = DEFAULT_WORKER_BUSY_TIMEOUT;
        }
        if self.worker_idle_timeout.is_zero() {
            self.worker_idle_timeout = DEFAULT_WORKER_IDLE_TIMEOUT;
        }
        if self.min_workers <= 0 {
            self.min_workers = 1;
        }
        if self.max_workers <= 0 {
            self.max_workers = 1;
        }
        if self.queue_size < 0 {
            self.queue_size = 0;
        }
        if self.min_workers > self.max_workers {
            self.max_workers = self.min_workers;
        }
        self
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
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.queue_size, 0);
        assert_eq!(config.worker_idle_timeout, Duration::from_millis(128));
        assert_eq!(config.worker_busy_timeout, Duration::from_millis(64));
    }

    #[test]
    fn test_config_builder() {
        let config = PoolConfig::new("uplinks")
            .with_min_workers(2)
            .with_max_workers(16)
            .with_queue_size(64)
            .with_worker_idle_timeout(Duration::from_secs(1))
            .with_worker_busy_timeout(Duration::from_millis(200));

        assert_eq!(config.name, "uplinks");
        assert_eq!(config.min_workers, 2);
        assert_eq!(config.max_workers, 16);
        assert_eq!(config.queue_size, 64);
        assert_eq!(config.worker_idle_timeout, Duration::from_secs(1));
        assert_eq!(config.worker_busy_timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_normalization_coerces_bounds() {
        let config = PoolConfig::new("test")
            .with_min_workers(0)
            .with_max_workers(-3)
            .with_queue_size(-5)
            .normalized();

        assert_eq!(config.min_workers, 1);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.queue_size, 0);
    }

    #[test]
    fn test_normalization_raises_ceiling_to_floor() {
        let config = PoolConfig::new("test")
            .with_min_workers(8)
            .with_max_workers(2)
            .normalized();

        assert_eq!(config.min_workers, 8);
        assert_eq!(config.max_workers, 8);
    }

    #[test]
    fn test_normalization_defaults_zero_timeouts() {
        let config = PoolConfig::new("test")
            .with_worker_idle_timeout(Duration::ZERO)
            .with_worker_busy_timeout(Duration::ZERO)
            .normalized();

        assert_eq!(config.worker_idle_timeout, DEFAULT_WORKER_IDLE_TIMEOUT);
        assert_eq!(config.worker_busy_timeout, DEFAULT_WORKER_BUSY_TIMEOUT);
    }

    #[test]
    fn test_serialization() {
        let config = PoolConfig::new("uplinks")
            .with_max_workers(4)
            .with_worker_busy_timeout(Duration::from_millis(250));

        let json = serde_json::to_string(&config).unwrap();
        let parsed: PoolConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config, parsed);
    }
}
