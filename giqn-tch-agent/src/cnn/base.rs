use super::AtariCnnConfig;
use crate::model::SubModel;
use tch::{nn, nn::Module, Device, Tensor};

/// Number of features after the last convolution for 84x84 frames.
pub(super) const N_CONV_FEATURES: i64 = 3136;

/// Convolutional neural network for Atari games, which has the same architecture of the DQN paper.
///
/// The input has the shape `[batch_size, n_stack, 84, 84]` and pixel
/// values in `[0, 255]`.
pub struct AtariCnn {
    config: AtariCnnConfig,
    device: Device,
    seq: nn::Sequential,
}

impl AtariCnn {
    fn stride(s: i64) -> nn::ConvConfig {
        nn::ConvConfig {
            stride: s,
            ..Default::default()
        }
    }

    fn create_net(p: &nn::Path, config: &AtariCnnConfig) -> nn::Sequential {
        let seq = nn::seq()
            .add_fn(|xs| xs.to_kind(tch::Kind::Float) / 255.0)
            .add(nn::conv2d(p / "c1", config.n_stack, 32, 8, Self::stride(4)))
            .add_fn(|xs| xs.relu())
            .add(nn::conv2d(p / "c2", 32, 64, 4, Self::stride(2)))
            .add_fn(|xs| xs.relu())
            .add(nn::conv2d(p / "c3", 64, 64, 3, Self::stride(1)))
            .add_fn(|xs| xs.relu().flat_view());

        if config.skip_linear {
            seq
        } else {
            seq.add(nn::linear(p / "l1", N_CONV_FEATURES, 512, Default::default()))
                .add_fn(|xs| xs.relu())
                .add(nn::linear(p / "l2", 512, config.out_dim, Default::default()))
        }
    }
}

impl SubModel for AtariCnn {
    type Config = AtariCnnConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, x: &Self::Input) -> Tensor {
        self.seq.forward(&x.to(self.device))
    }

    fn build(p: &nn::Path, config: Self::Config) -> Self {
        let device = p.device();
        let seq = Self::create_net(p, &config);

        Self {
            config,
            device,
            seq,
        }
    }

    fn clone_with_path(&self, p: &nn::Path) -> Self {
        Self::build(p, self.config.clone())
    }
}
