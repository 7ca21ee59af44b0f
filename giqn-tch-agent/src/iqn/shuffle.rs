//! Permutation of the fraction axis of quantile samples.
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tch::{Device, Tensor};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
/// How current and target quantile samples are paired along the fraction axis.
pub enum QuantileShuffle {
    /// Current and target samples are permuted independently.
    ///
    /// Fractions follow the current samples they were drawn for.
    Independent,

    /// Both are permuted with the same permutation.
    Shared,

    /// Samples are paired in the order they were computed.
    Disabled,
}

impl Default for QuantileShuffle {
    fn default() -> Self {
        Self::Independent
    }
}

/// Seeded source of permutations of the fraction axis.
pub struct QuantileShuffler {
    mode: QuantileShuffle,
    rng: SmallRng,
}

impl QuantileShuffler {
    pub fn new(mode: QuantileShuffle, seed: u64) -> Self {
        Self {
            mode,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn permutation(&mut self, n: i64, device: Device) -> Tensor {
        let mut ixs: Vec<i64> = (0..n).collect();
        ixs.shuffle(&mut self.rng);
        Tensor::from_slice(&ixs).to(device)
    }

    /// Returns index tensors for the current and target samples.
    ///
    /// Both are `None` when shuffling is disabled. No random number is drawn
    /// in that case.
    pub fn permutations(&mut self, n: i64, device: Device) -> (Option<Tensor>, Option<Tensor>) {
        match self.mode {
            QuantileShuffle::Disabled => (None, None),
            QuantileShuffle::Shared => {
                let p = self.permutation(n, device);
                (Some(p.shallow_clone()), Some(p))
            }
            QuantileShuffle::Independent => {
                let p1 = self.permutation(n, device);
                let p2 = self.permutation(n, device);
                (Some(p1), Some(p2))
            }
        }
    }

    /// Permutes the fraction axis (axis 1) of quantile samples.
    ///
    /// * `current` and `target` have the shape `[batch_size, n, 1]`.
    /// * `tau` has the shape `[batch_size, n]` and is permuted with `current`.
    pub fn shuffle(
        &mut self,
        current: &Tensor,
        tau: &Tensor,
        target: &Tensor,
    ) -> (Tensor, Tensor, Tensor) {
        let n = current.size()[1];
        assert_eq!(
            target.size()[1],
            n,
            "Current and target samples must have the same number of fractions"
        );
        match self.permutations(n, current.device()) {
            (Some(p1), Some(p2)) => (
                current.index_select(1, &p1),
                tau.index_select(1, &p1.to(tau.device())),
                target.index_select(1, &p2.to(target.device())),
            ),
            _ => (
                current.shallow_clone(),
                tau.shallow_clone(),
                target.shallow_clone(),
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tch::Kind::Float;

    fn samples() -> (Tensor, Tensor, Tensor) {
        let current = Tensor::arange(8, (Float, Device::Cpu)).view([1, 8, 1]);
        let tau = Tensor::arange(8, (Float, Device::Cpu)).view([1, 8]) / 8.0;
        let target = Tensor::arange(8, (Float, Device::Cpu)).view([1, 8, 1]) * 10.0;
        (current, tau, target)
    }

    #[test]
    fn test_disabled_keeps_order() {
        let (current, tau, target) = samples();
        let mut shuffler = QuantileShuffler::new(QuantileShuffle::Disabled, 0);
        let (c, t, g) = shuffler.shuffle(&current, &tau, &target);
        assert!(c.equal(&current));
        assert!(t.equal(&tau));
        assert!(g.equal(&target));
    }

    #[test]
    fn test_fractions_follow_current_samples() {
        let (current, tau, target) = samples();
        let mut shuffler = QuantileShuffler::new(QuantileShuffle::Independent, 7);
        let (c, t, g) = shuffler.shuffle(&current, &tau, &target);
        assert!((c.view([1, 8]) / 8.0).equal(&t));

        // Permutations keep the multiset of values.
        let (sorted, _) = g.view([-1]).sort(0, false);
        assert!(sorted.equal(&target.view([-1])));
    }

    #[test]
    fn test_shared_keeps_pairs() {
        let (current, tau, target) = samples();
        let mut shuffler = QuantileShuffler::new(QuantileShuffle::Shared, 3);
        let (c, _, g) = shuffler.shuffle(&current, &tau, &target);
        assert!((c * 10.0).equal(&g));
    }

    #[test]
    fn test_seeded_permutations_are_reproducible() {
        let mut s1 = QuantileShuffler::new(QuantileShuffle::Independent, 11);
        let mut s2 = QuantileShuffler::new(QuantileShuffle::Independent, 11);
        for _ in 0..3 {
            let (a1, b1) = s1.permutations(16, Device::Cpu);
            let (a2, b2) = s2.permutations(16, Device::Cpu);
            assert!(a1.unwrap().equal(&a2.unwrap()));
            assert!(b1.unwrap().equal(&b2.unwrap()));
        }
    }
}
