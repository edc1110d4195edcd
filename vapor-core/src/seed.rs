use rand::Rng;

/// Range of the auto-drawn seed: non-negative and at least 31 bits wide,
/// matching what callers can round-trip through the JSON surface.
pub const SEED_RANGE: u64 = 1 << 31;

/// Source of seeds for requests that do not supply one. Injectable so tests
/// can script the draws; the production source pulls thread-local entropy,
/// giving independent draws per call with no shared cursor.
pub trait SeedSource: Send + Sync {
    fn next_seed(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EntropySeedSource;

impl SeedSource for EntropySeedSource {
    fn next_seed(&self) -> u64 {
        rand::thread_rng().gen_range(0..SEED_RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_stay_in_declared_range() {
        let source = EntropySeedSource;
        for _ in 0..1000 {
            assert!(source.next_seed() < SEED_RANGE);
        }
    }

    #[test]
    fn draws_do_not_repeat_a_fixed_value() {
        // 64 draws from a 2^31 range collide with probability ~1e-6; a
        // constant fallback would fail this immediately.
        let source = EntropySeedSource;
        let first = source.next_seed();
        let distinct = (0..64).any(|_| source.next_seed() != first);
        assert!(distinct);
    }
}
