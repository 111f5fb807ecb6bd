use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Inclusive range of milliseconds, written `MIN..MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange::fixed(0);

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        DelayRange { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        DelayRange::new(ms, ms)
    }

    pub fn sample(&self) -> Duration {
        let ms = if self.min_ms >= self.max_ms {
            self.min_ms
        } else {
            rand::rng().random_range(self.min_ms..=self.max_ms)
        };
        Duration::from_millis(ms)
    }
}

impl FromStr for DelayRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid milliseconds {part:?}: {e}"))
        };
        match s.split_once("..") {
            Some((min, max)) => {
                let (min, max) = (parse(min)?, parse(max)?);
                if min > max {
                    return Err(format!("empty delay range {s:?}"));
                }
                Ok(DelayRange::new(min, max))
            }
            None => parse(s).map(DelayRange::fixed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// After navigating to a listing page.
    Listing,
    /// After a subject has been fully processed.
    Subject,
    /// After a row's comment cycle.
    Row,
    /// After a disclosure action and after its content became visible.
    Settle,
}

#[derive(Debug, Clone, Copy)]
pub struct DelayPolicy {
    pub listing: DelayRange,
    pub subject: DelayRange,
    pub row: DelayRange,
    pub settle: DelayRange,
}

impl DelayPolicy {
    pub const NONE: DelayPolicy = DelayPolicy {
        listing: DelayRange::ZERO,
        subject: DelayRange::ZERO,
        row: DelayRange::ZERO,
        settle: DelayRange::ZERO,
    };
}

/// Randomized pauses between requests, plus an optional cap shared by all workers.
///
/// Pauses are taken by the calling task only, so each worker paces itself.
/// The total is summed across workers.
pub struct Politeness {
    delays: DelayPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
    total_ms: AtomicU64,
}

impl Politeness {
    pub fn new(delays: DelayPolicy, requests_per_minute: Option<NonZeroU32>) -> Self {
        Politeness {
            delays,
            limiter: requests_per_minute.map(|n| RateLimiter::direct(Quota::per_minute(n))),
            total_ms: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Politeness::new(DelayPolicy::NONE, None)
    }

    pub async fn pause(&self, pause: Pause) {
        let range = match pause {
            Pause::Listing => self.delays.listing,
            Pause::Subject => self.delays.subject,
            Pause::Row => self.delays.row,
            Pause::Settle => self.delays.settle,
        };
        let delay = range.sample();
        if delay.is_zero() {
            return;
        }
        debug!("Pausing {:?} for {} ms", pause, delay.as_millis());
        tokio::time::sleep(delay).await;
        self.total_ms
            .fetch_add(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Waits for a slot under the shared request cap, if one is configured.
    pub async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_ranges() {
        assert_eq!("2000..5000".parse(), Ok(DelayRange::new(2000, 5000)));
        assert_eq!("1000".parse(), Ok(DelayRange::fixed(1000)));
        assert_eq!(" 5 .. 5 ".parse(), Ok(DelayRange::fixed(5)));
        assert!("5..1".parse::<DelayRange>().is_err());
        assert!("a..1".parse::<DelayRange>().is_err());
    }

    #[test]
    fn samples_stay_in_range() {
        let range = DelayRange::new(10, 20);
        for _ in 0..100 {
            let ms = range.sample().as_millis() as u64;
            assert!((10..=20).contains(&ms));
        }
        assert_eq!(DelayRange::fixed(7).sample(), Duration::from_millis(7));
    }

    #[tokio::test]
    async fn accumulates_total_pause_time() {
        let politeness = Politeness::new(
            DelayPolicy {
                settle: DelayRange::fixed(5),
                ..DelayPolicy::NONE
            },
            None,
        );
        politeness.pause(Pause::Settle).await;
        politeness.pause(Pause::Settle).await;
        politeness.pause(Pause::Subject).await;
        assert_eq!(politeness.total(), Duration::from_millis(10));
    }
}
