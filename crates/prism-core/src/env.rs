//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples state projection from system resources
//! (wall-clock time, randomness). Timestamps written into the state tree
//! (`created_on`, `end_time`, typing indicators) and locally generated
//! message ids all come from here, so a seeded implementation reproduces a
//! run exactly.
//!
//! # Invariants
//!
//! - Monotonicity: `now_millis()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{SystemTime, UNIX_EPOCH};

/// Abstract environment providing time and randomness.
///
/// The pipeline is single-threaded, so implementations only need to be
/// `Clone`; they are never sent across threads.
pub trait Environment: Clone + 'static {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: Subsequent calls must return values `>=` previous
    ///   calls within one execution context.
    fn now_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during simulations: Given the same RNG seed, this produces
    ///   the same sequence of bytes
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for client-side message ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment using system time and OS randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Message ids only need uniqueness within a session; zeros fall
            // back to the counter suffix added by the chat client.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_does_not_go_backwards() {
        let env = SystemEnv::new();

        let t1 = env.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let t2 = env.now_millis();

        assert!(t2 >= t1, "time must be monotonic");
        assert!(t1 > 0);
    }

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];

        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        assert_ne!(bytes1, bytes2, "random bytes should differ");
    }
}
