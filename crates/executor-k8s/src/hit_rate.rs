use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Percentage sampler deciding whether an optional feature applies to a run.
pub trait HitSampler: Send + Sync {
    /// A draw from `0..100`.
    fn draw(&self) -> u32;

    fn hit(&self, rate: u32) -> bool {
        self.draw() < rate
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSampler;

impl HitSampler for RandomSampler {
    fn draw(&self) -> u32 {
        rand::rng().random_range(0..100)
    }
}

/// Reproducible sequence of draws.
pub struct SeededSampler {
    rng: Mutex<StdRng>,
}

impl SeededSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl HitSampler for SeededSampler {
    fn draw(&self) -> u32 {
        self.rng.lock().random_range(0..100)
    }
}
