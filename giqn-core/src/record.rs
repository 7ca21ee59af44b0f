//! Types and traits for recording training telemetry.
//!
//! An agent returns a [`Record`] from every optimization step. The driver
//! hands it to a [`Recorder`], which writes the values to some destination
//! (TensorBoard in `giqn-tensorboard`, a memory buffer in tests, nowhere
//! with [`NullRecorder`]).
//!
//! ```rust
//! use giqn_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss_quantile", 0.25);
//! record.insert("q_online_dist", RecordValue::Array1(vec![1.0, 2.0, 3.0]));
//! assert_eq!(record.get_scalar("loss_quantile").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
