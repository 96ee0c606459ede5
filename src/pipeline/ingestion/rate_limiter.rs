use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Budgets for outbound OCR traffic. `None` or zero leaves a budget off.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Limits {
    pub requests_per_min: Option<u64>,
    /// Image payload bytes sent per minute
    pub bytes_per_min: Option<u64>,
    pub concurrency: Option<u32>,
}

/// Continuously refilled bucket holding at most one minute of budget
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    per_sec: f64,
    state: Mutex<(f64, Instant)>,
}

impl TokenBucket {
    fn per_minute(budget: Option<u64>) -> Option<Self> {
        let capacity = budget.filter(|b| *b > 0)? as f64;
        Some(Self {
            capacity,
            per_sec: capacity / 60.0,
            state: Mutex::new((capacity, Instant::now())),
        })
    }

    /// Wait until `cost` tokens are available, then take them. A cost above
    /// capacity is charged as a full bucket.
    async fn take(&self, cost: f64, what: &str) {
        let cost = cost.min(self.capacity);
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let refilled = state.0 + now.duration_since(state.1).as_secs_f64() * self.per_sec;
                *state = (refilled.min(self.capacity), now);
                if state.0 >= cost {
                    state.0 -= cost;
                    return;
                }
                (cost - state.0) / self.per_sec
            };
            debug!("OCR {} budget spent, waiting {:.3}s", what, wait);
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.001))).await;
        }
    }

    #[cfg(test)]
    async fn drain(&self) {
        *self.state.lock().await = (0.0, Instant::now());
    }
}

/// Shared gate in front of the OCR endpoint
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Option<Arc<TokenBucket>>,
    bytes: Option<Arc<TokenBucket>>,
    slots: Option<Arc<Semaphore>>,
}

/// Held for the duration of one request; dropping it frees the concurrency slot
#[derive(Debug)]
pub struct RatePermit {
    _slot: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self {
            requests: TokenBucket::per_minute(limits.requests_per_min).map(Arc::new),
            bytes: TokenBucket::per_minute(limits.bytes_per_min).map(Arc::new),
            slots: limits
                .concurrency
                .filter(|c| *c > 0)
                .map(|c| Arc::new(Semaphore::new(c as usize))),
        }
    }

    /// Wait for a concurrency slot, one request token and `payload_bytes`
    /// byte tokens
    pub async fn acquire(&self, payload_bytes: u64) -> RatePermit {
        let slot = match &self.slots {
            Some(slots) => slots.clone().acquire_owned().await.ok(),
            None => None,
        };
        if let Some(requests) = &self.requests {
            requests.take(1.0, "request").await;
        }
        if let Some(bytes) = &self.bytes {
            bytes.take(payload_bytes as f64, "byte").await;
        }
        RatePermit { _slot: slot }
    }

    pub fn available_slots(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }

    #[cfg(test)]
    pub(crate) async fn drain(&self) {
        if let Some(requests) = &self.requests {
            requests.drain().await;
        }
        if let Some(bytes) = &self.bytes {
            bytes.drain().await;
        }
    }
}
