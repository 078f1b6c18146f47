//! Admission control
//!
//! A named queue in front of handler work: a token-bucket rate limit plus a
//! cap on concurrently admitted requests. Workers ask for a token before
//! touching the request; dropping the token releases the in-flight slot.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

/// Rate configuration for a server's admission queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests admitted per second (0 = unlimited)
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: u32,
    /// Burst capacity above the steady rate
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Maximum concurrently admitted requests
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_rate_per_sec() -> u32 {
    1000
}

fn default_burst() -> u32 {
    2000
}

fn default_max_in_flight() -> usize {
    1024
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        AdmissionConfig {
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Token bucket state
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Bucket {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Grant held while a request is in flight; dropping it is `done`
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
}

/// Named admission queue for one server instance
pub struct AdmissionQueue {
    name: String,
    bucket: Option<Mutex<Bucket>>,
    permits: Arc<Semaphore>,
}

impl AdmissionQueue {
    pub fn new(name: impl Into<String>, config: AdmissionConfig) -> Self {
        let bucket = if config.rate_per_sec > 0 {
            Some(Mutex::new(Bucket::new(
                config.burst.max(1) as f64,
                config.rate_per_sec as f64,
            )))
        } else {
            None
        };

        AdmissionQueue {
            name: name.into(),
            bucket,
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask for admission. `None` means refused; the caller drops the packet.
    pub async fn ask(&self) -> Option<AdmissionToken> {
        if let Some(ref bucket) = self.bucket {
            let mut bucket = bucket.lock().await;
            if !bucket.try_consume() {
                debug!(queue = %self.name, "admission refused by rate limit");
                return None;
            }
        }

        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Some(AdmissionToken { _permit: permit }),
            Err(TryAcquireError::NoPermits) => {
                debug!(queue = %self.name, "admission refused, in-flight cap reached");
                None
            }
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Release an admission token
    ///
    /// Equivalent to dropping the token; spelled out for call sites that
    /// want the release explicit.
    pub fn done(&self, token: AdmissionToken) {
        drop(token);
    }

    /// Number of in-flight slots currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
