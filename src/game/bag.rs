//! Draw-without-replacement pools for cosmetic indices

use rand::Rng;

/// Hands out every index in `0..size` once, in random order, then refills.
#[derive(Debug, Clone)]
pub struct ShuffleBag {
    size: u8,
    remaining: Vec<u8>,
}

impl ShuffleBag {
    pub fn new(size: u8) -> Self {
        Self {
            size,
            remaining: (0..size).collect(),
        }
    }

    /// Draw the next index. A bag of size zero always yields 0.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u8 {
        if self.size == 0 {
            return 0;
        }
        if self.remaining.is_empty() {
            self.refill();
        }
        let pick = rng.gen_range(0..self.remaining.len());
        self.remaining.swap_remove(pick)
    }

    pub fn refill(&mut self) {
        self.remaining = (0..self.size).collect();
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
