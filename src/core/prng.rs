// Small deterministic PRNG (no external crates).
//
// This is NOT cryptographically secure.
// Every random draw of a simulation (response sampling and condition edges) goes
// through one of these, so a seed fully determines a run.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform draw in [0,1) with 53 bits of precision.
    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Seed for an independent child stream (one per subject).
    pub fn split_seed(&mut self) -> u64 {
        // splitmix64 finaliser so neighbouring draws give unrelated streams.
        let mut z = self.next_u64().wrapping_add(0x9E3779B97F4A7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Pick an index from a cumulative probability table.
    ///
    /// Returns `None` with probability `1 - cumulative.last()`, i.e. when the draw
    /// lands in the unassigned mass.
    pub fn choose_cumulative(&mut self, cumulative: &[f64]) -> Option<usize> {
        let r = self.next_f64_01();
        cumulative.iter().position(|&c| r < c)
    }

    /// Pick an index with probability proportional to `weights`.
    ///
    /// All weights must be non-negative and at least one positive.
    pub fn choose_weighted(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        let q = self.next_f64_01() * total;
        let mut acc = 0.0;
        for (i, &w) in weights.iter().enumerate() {
            acc += w;
            if q < acc {
                return i;
            }
        }
        // Rounding at the top of the range: fall back to the last positive weight.
        weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
    }
}
