//! Simulated environment: virtual time and a seeded RNG.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use idscp_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Simulation environment using Tokio's clock and a seeded RNG.
///
/// - **Virtual Time**: `now()` reads Tokio's clock. Inside a Turmoil
///   simulation or under a paused Tokio runtime the clock is virtual and
///   sleeps complete instantly.
///
/// - **Seeded RNG**: `random_bytes()` draws from a `ChaCha20Rng`, so the
///   challenge nonces of a run are fixed by its seed.
///
/// Clones share one RNG, so two sessions built from clones of the same
/// `SimEnv` still draw distinct nonces.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// Environment seeded with 0
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment seeded with `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, dest: &mut [u8]) {
        // A panic while filling cannot leave the RNG half-updated
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(dest);
    }
}
