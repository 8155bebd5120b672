use serde::{Deserialize, Serialize};

/// Seeded generator driving every random choice in a simulation run.
///
/// Same seed, same sequence, on every platform. Never use it for anything
/// but simulation scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        // High bits of an LCG are the well-mixed ones.
        self.state ^ (self.state >> 29)
    }

    /// Uniform-ish value in `[0, upper)`; 0 when `upper` is 0.
    pub const fn below(&mut self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.next_u64() % upper
    }

    /// Index into a collection of `len` items.
    pub fn index(&mut self, len: usize) -> usize {
        let upper = u64::try_from(len).unwrap_or(u64::MAX);
        usize::try_from(self.below(upper)).unwrap_or(0)
    }

    /// Bernoulli trial with an integer percentage. 0 never consumes state.
    pub fn chance(&mut self, percent: u8) -> bool {
        if percent == 0 {
            return false;
        }
        if percent >= 100 {
            return true;
        }
        self.below(100) < u64::from(percent)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.index(items.len()))
    }
}
