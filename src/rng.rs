//! Injectable random source.
//!
//! Every probabilistic decision (template pick, ALPN variance, optional
//! headers, profile generation) draws from a `SharedRng` handed in by the
//! caller, so a seeded session replays the same choices.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Random source shared between the components of one session.
pub type SharedRng = Arc<Mutex<StdRng>>;

/// Create a shared random source, seeded when `seed` is given.
pub fn shared_rng(seed: Option<u64>) -> SharedRng {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Arc::new(Mutex::new(rng))
}

/// Run `f` with exclusive access to the random source.
///
/// The lock is never held across an await point.
pub fn with_rng<T>(rng: &SharedRng, f: impl FnOnce(&mut StdRng) -> T) -> T {
    let mut guard = rng.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_seeded_sources_replay() {
        let a = shared_rng(Some(42));
        let b = shared_rng(Some(42));
        let xs: Vec<u32> = (0..8).map(|_| with_rng(&a, |r| r.gen())).collect();
        let ys: Vec<u32> = (0..8).map(|_| with_rng(&b, |r| r.gen())).collect();
        assert_eq!(xs, ys);
    }
}
