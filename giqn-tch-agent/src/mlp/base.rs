use super::MlpConfig;
use crate::model::SubModel;
use tch::{nn, nn::Module, Device, Tensor};

/// Multilayer perceptron.
///
/// Linear layers are applied to the last axis, so inputs may carry extra
/// leading axes such as the fraction axis of quantile features.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    seq: nn::Sequential,
}

impl Mlp {
    fn create_net(p: &nn::Path, config: &MlpConfig) -> nn::Sequential {
        let mut seq = nn::seq();
        let mut in_dim = config.in_dim;

        for (i, &out_dim) in config.units.iter().enumerate() {
            let activation = config.activation;
            seq = seq.add(nn::linear(
                p / format!("ln{}", i),
                in_dim,
                out_dim,
                Default::default(),
            ));
            seq = seq.add_fn(move |x| activation.apply(x));
            in_dim = out_dim;
        }

        seq = seq.add(nn::linear(
            p / format!("ln{}", config.units.len()),
            in_dim,
            config.out_dim,
            Default::default(),
        ));

        if config.activation_out {
            seq = seq.add_fn(|x| x.relu());
        }

        seq
    }
}

impl SubModel for Mlp {
    type Config = MlpConfig;
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
