//! IQN agent with an adversarial critic, implemented with [tch](https://crates.io/crates/tch).
pub mod cnn;
pub mod error;
pub mod iqn;
pub mod mlp;
pub mod model;
pub mod opt;
mod tensor_batch;
pub mod util;
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using tch.
///
/// This enum is added because [`tch::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),

    /// The main MPS device.
    Mps,

    /// The main Vulkan device.
    Vulkan,
}

impl From<tch::Device> for Device {
    fn from(device: tch::Device) -> Self {
        match device {
            tch::Device::Cpu => Self::Cpu,
            tch::Device::Cuda(n) => Self::Cuda(n),
            tch::Device::Mps => Self::Mps,
            tch::Device::Vulkan => Self::Vulkan,
        }
    }
}

impl From<Device> for tch::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => Self::Cpu,
            Device::Cuda(n) => Self::Cuda(n),
            Device::Mps => Self::Mps,
            Device::Vulkan => Self::Vulkan,
        }
    }
}
