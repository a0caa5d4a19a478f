// =============================================================================
// Nonce Generator — strictly increasing per-client request counter
// =============================================================================
//
// Every signed request carries a nonce the exchange uses to reject replays.
// The exchange only accepts a nonce greater than the last one it saw for the
// key, so the counter is seeded from wall-clock milliseconds: a freshly started
// process picks up above whatever a previous instance sent (best-effort, a
// clock rollback can still collide).
// =============================================================================

use chrono::Utc;
use parking_lot::Mutex;

/// Process-local, strictly increasing nonce source.
///
/// One generator is owned by each [`ExchangeClient`](super::client::ExchangeClient)
/// and shared through `Arc`. The lock is held only for the increment.
#[derive(Debug)]
pub struct NonceGenerator {
    counter: Mutex<i64>,
}

impl NonceGenerator {
    /// Seed the counter from the current time in milliseconds since epoch.
    pub fn new() -> Self {
        Self::with_seed(Utc::now().timestamp_millis())
    }

    /// Seed the counter explicitly. The first call to [`next`](Self::next)
    /// returns `seed + 1`.
    pub fn with_seed(seed: i64) -> Self {
        Self {
            counter: Mutex::new(seed),
        }
    }

    /// Return a value strictly greater than every value returned before.
    pub fn next(&self) -> i64 {
        let mut counter = self.counter.lock();
        *counter += 1;
        *counter
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
