//! Sampling of quantile fractions.
use serde::{Deserialize, Serialize};
use tch::{Device, Kind, Tensor};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// The way of taking quantile fractions (percent points).
pub enum IqnSample {
    /// Samples over percent points `0.05:0.1:0.95`.
    ///
    /// The precent points are constants.
    Const10,

    /// `n` samples from the uniform distribution on `[0, 1)`.
    Uniform(i64),

    /// `n` evenly spaced fractions `(i + 0.5) / n`.
    Evenly(i64),

    /// Single sample, median.
    Median,
}

impl IqnSample {
    /// Returns samples of percent points with the shape `[batch_size, n]`.
    ///
    /// Uniform samples are drawn from the global tch generator, which is
    /// seeded with [`tch::manual_seed`].
    pub fn sample(&self, batch_size: i64, device: Device) -> Tensor {
        let n = self.n_percent_points();
        assert!(n >= 1, "The number of fractions must be positive, got {}", n);
        let options = (Kind::Float, device);
        match self {
            Self::Const10 => Tensor::from_slice(&[
                0.05_f32, 0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85, 0.95,
            ])
            .to(device)
            .unsqueeze(0)
            .repeat(&[batch_size, 1]),
            Self::Uniform(n) => Tensor::rand(&[batch_size, *n], options),
            Self::Evenly(n) => ((Tensor::arange(*n, options) + 0.5) / (*n as f64))
                .unsqueeze(0)
                .repeat(&[batch_size, 1]),
            Self::Median => Tensor::full(&[batch_size, 1], 0.5, options),
        }
    }

    /// Returns the number of percent points generated by this way.
    pub fn n_percent_points(&self) -> i64 {
        match self {
            Self::Const10 => 10,
            Self::Uniform(n) => *n,
            Self::Evenly(n) => *n,
            Self::Median => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shapes_and_range() {
        for mode in [
            IqnSample::Const10,
            IqnSample::Uniform(7),
            IqnSample::Evenly(4),
            IqnSample::Median,
        ] {
            let tau = mode.sample(3, Device::Cpu);
            assert_eq!(tau.size(), vec![3, mode.n_percent_points()]);
            assert!(tau.min().double_value(&[]) >= 0.0);
            assert!(tau.max().double_value(&[]) < 1.0);
        }
    }

    #[test]
    fn test_evenly_spaced_fractions() {
        let tau = IqnSample::Evenly(4).sample(1, Device::Cpu).view([-1]);
        let tau = Vec::<f32>::try_from(&tau).unwrap();
        assert_eq!(tau, vec![0.125, 0.375, 0.625, 0.875]);
    }

    #[test]
    #[should_panic]
    fn test_zero_fractions_are_rejected() {
        let _ = IqnSample::Uniform(0).sample(2, Device::Cpu);
    }
}
