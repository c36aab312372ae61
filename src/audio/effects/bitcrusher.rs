use super::AudioEffect;

const MIN_BITS: u32 = 1;
const MAX_BITS: u32 = 15;

/// Stateless quantizer reducing the signal to `2^bits` evenly spaced levels.
///
/// Bit depths outside `1..=15` are clamped at construction.
#[derive(Debug, Clone)]
pub struct Bitcrusher {
    bits: u32,
    levels: i32,
    step: i32,
}

impl Bitcrusher {
    pub fn new(bits: u32) -> Self {
        let bits = bits.clamp(MIN_BITS, MAX_BITS);
        let levels = 1i32 << bits;
        let step = (65536.0 / levels as f64).round() as i32;
        Self { bits, levels, step }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    fn crush(&self, sample: i16) -> i16 {
        let offset = sample as i32 + 32768;
        let index = (offset as f64 / self.step as f64).round_ties_even() as i32;
        // The top level would land on +32768; folding it onto the one below
        // keeps exactly `levels` distinct outputs. Full-scale positive input
        // therefore saturates one step below i16::MAX (31744 at 6 bits).
        let index = index.min(self.levels - 1);
        (index * self.step - 32768).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

impl AudioEffect for Bitcrusher {
    fn process(&mut self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            *sample = self.crush(*sample);
        }
    }

    fn name(&self) -> &'static str {
        "bitcrush"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn full_domain() -> Vec<i16> {
        (i16::MIN..=i16::MAX).collect()
    }

    #[test]
    fn test_bits_are_clamped() {
        assert_eq!(Bitcrusher::new(0).bits(), 1);
        assert_eq!(Bitcrusher::new(6).bits(), 6);
        assert_eq!(Bitcrusher::new(16).bits(), 15);
        assert_eq!(Bitcrusher::new(u32::MAX).bits(), 15);
    }

    #[test]
    fn test_distinct_outputs_bounded_by_levels() {
        for bits in MIN_BITS..=MAX_BITS {
            let mut crusher = Bitcrusher::new(bits);
            let mut domain = full_domain();
            crusher.process(&mut domain);

            let distinct: HashSet<i16> = domain.into_iter().collect();
            assert!(
                distinct.len() <= 1usize << bits,
                "bits={} produced {} distinct values",
                bits,
                distinct.len()
            );
        }
    }

    #[test]
    fn test_random_blocks_land_on_grid() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut crusher = Bitcrusher::new(6);
        let step = 1024i32;

        let mut block: Vec<i16> = (0..4096).map(|_| rng.gen_range(i16::MIN..=i16::MAX)).collect();
        crusher.process(&mut block);

        for sample in block {
            assert_eq!((sample as i32 + 32768) % step, 0, "{} is off the grid", sample);
        }
    }

    #[test]
    fn test_silence_stays_silent_and_extremes_stay_in_range() {
        let mut crusher = Bitcrusher::new(6);
        let mut block = vec![0, i16::MIN, i16::MAX];
        crusher.process(&mut block);
        assert_eq!(block[0], 0);
        assert_eq!(block[1], i16::MIN);
        assert_eq!(block[2], 31744);
    }

    #[test]
    fn test_top_of_range_folds_onto_highest_level() {
        let mut crusher = Bitcrusher::new(6);
        let mut block = vec![32767, 32300, 31744, 31000];
        crusher.process(&mut block);
        assert_eq!(block, vec![31744, 31744, 31744, 30720]);
    }
}
