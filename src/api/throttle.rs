use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Attempt budget for one kind of request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    /// Upper bound of the uniform jitter added to each backoff, in seconds
    pub jitter_max: f64,
    /// Wait a randomized moment before every attempt after the first
    pub pre_request_delay: bool,
}

impl RetryPolicy {
    /// Quotes and daily history: 5 attempts, 20s each, jitter up to 1s
    pub const QUOTE: RetryPolicy = RetryPolicy {
        max_attempts: 5,
        timeout: Duration::from_secs(20),
        jitter_max: 1.0,
        pre_request_delay: true,
    };

    /// Fundamentals: 3 attempts, 15s each, jitter up to 0.5s
    pub const FUNDAMENTALS: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        timeout: Duration::from_secs(15),
        jitter_max: 0.5,
        pre_request_delay: false,
    };
}

/// Every place the pipeline deliberately waits
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pause {
    /// After failed attempt `attempt` (0-based): 2^attempt + jitter
    Backoff { attempt: u32, jitter_max: f64 },
    /// Before a retry attempt
    PreRequest,
    /// Between symbols of a batch; `deep` when history is fetched too
    Pacing { index: usize, deep: bool },
    /// Before the deferred retry pass starts
    RecoveryWait,
    /// Between symbols of the deferred retry pass
    RecoveryPacing,
    /// Between market-wide chunk requests
    ChunkGap,
}

/// Sleep and identity policy for outgoing requests.
///
/// Production uses randomized delays; tests plug in [`NoDelay`].
pub trait Throttle: Send + Sync {
    fn delay(&self, pause: Pause) -> Duration;

    fn user_agent(&self) -> &'static str;
}

/// Randomized jitter, pacing and user-agent rotation
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomThrottle;

impl RandomThrottle {
    fn uniform(min_secs: f64, max_secs: f64) -> Duration {
        let secs = rand::thread_rng().gen_range(min_secs..max_secs);
        Duration::from_secs_f64(secs)
    }
}

impl Throttle for RandomThrottle {
    fn delay(&self, pause: Pause) -> Duration {
        match pause {
            Pause::Backoff {
                attempt,
                jitter_max,
            } => {
                let base = 2u64.saturating_pow(attempt) as f64;
                let jitter = if jitter_max > 0.0 {
                    rand::thread_rng().gen_range(0.0..jitter_max)
                } else {
                    0.0
                };
                Duration::from_secs_f64(base + jitter)
            }
            Pause::PreRequest => Self::uniform(0.3, 1.5),
            Pause::Pacing { index, deep: true } => {
                if (index + 1) % 3 == 0 {
                    Self::uniform(1.5, 3.0)
                } else {
                    Self::uniform(0.5, 1.2)
                }
            }
            Pause::Pacing { index, deep: false } => {
                if (index + 1) % 10 == 0 {
                    Self::uniform(1.0, 2.0)
                } else {
                    Self::uniform(0.3, 0.8)
                }
            }
            Pause::RecoveryWait => Duration::from_secs(10),
            Pause::RecoveryPacing => Self::uniform(2.0, 4.0),
            Pause::ChunkGap => Duration::from_millis(500),
        }
    }

    fn user_agent(&self) -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }
}

/// Zero-delay, fixed-identity policy for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Throttle for NoDelay {
    fn delay(&self, _pause: Pause) -> Duration {
        Duration::ZERO
    }

    fn user_agent(&self) -> &'static str {
        USER_AGENTS[0]
    }
}

/// Sleep for the pause the throttle prescribes, skipping zero waits
pub async fn pause(throttle: &dyn Throttle, pause: Pause) {
    let duration = throttle.delay(pause);
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_with_bounded_jitter() {
        let throttle = RandomThrottle;
        for attempt in 0..4 {
            let delay = throttle
                .delay(Pause::Backoff {
                    attempt,
                    jitter_max: 1.0,
                })
                .as_secs_f64();
            let base = 2f64.powi(attempt as i32);
            assert!(delay >= base && delay < base + 1.0, "attempt {}: {}", attempt, delay);
        }
    }

    #[test]
    fn test_pacing_ranges() {
        let throttle = RandomThrottle;

        let burst = throttle.delay(Pause::Pacing { index: 2, deep: true });
        assert!(burst >= Duration::from_secs_f64(1.5) && burst < Duration::from_secs(3));

        let normal = throttle.delay(Pause::Pacing { index: 0, deep: true });
        assert!(normal >= Duration::from_secs_f64(0.5) && normal < Duration::from_secs_f64(1.2));

        let light = throttle.delay(Pause::Pacing { index: 9, deep: false });
        assert!(light >= Duration::from_secs(1) && light < Duration::from_secs(2));

        let recovery = throttle.delay(Pause::RecoveryPacing);
        assert!(recovery >= Duration::from_secs(2) && recovery < Duration::from_secs(4));

        assert_eq!(throttle.delay(Pause::RecoveryWait), Duration::from_secs(10));
        assert_eq!(throttle.delay(Pause::ChunkGap), Duration::from_millis(500));
    }

    #[test]
    fn test_user_agent_from_pool() {
        let throttle = RandomThrottle;
        for _ in 0..10 {
            assert!(USER_AGENTS.contains(&throttle.user_agent()));
        }
    }

    #[test]
    fn test_no_delay() {
        let throttle = NoDelay;
        assert_eq!(
            throttle.delay(Pause::Backoff {
                attempt: 4,
                jitter_max: 1.0
            }),
            Duration::ZERO
        );
        assert_eq!(throttle.delay(Pause::RecoveryWait), Duration::ZERO);
    }
}
