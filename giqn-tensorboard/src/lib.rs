//! TensorBoard recorder.
//!
//! Scalars become TensorBoard scalars and [`RecordValue::Array1`] values
//! become histograms, which is how the distributions of quantile values are
//! inspected during training.
use giqn_core::record::{Record, RecordValue, Recorder};
use log::warn;
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

const N_BUCKETS: usize = 30;
const STEP_KEY: &str = "opt_steps";

/// Write records to TFRecord.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`. The step of each record is read
    /// from the scalar named `opt_steps`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
        }
    }

    fn add_histogram(&mut self, tag: &str, data: &[f32], step: usize) {
        let h = match Histogram::new(data, N_BUCKETS) {
            Some(h) => h,
            None => {
                warn!("Histogram '{}' without finite samples is dropped", tag);
                return;
            }
        };
        self.writer.add_histogram_raw(
            tag,
            h.min,
            h.max,
            h.num,
            h.sum,
            h.sum_squares,
            &h.bucket_limits,
            &h.bucket_counts,
            step,
        );
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a given [`Record`] into a TFRecord.
    ///
    /// Records without the step counter are dropped with a warning.
    fn write(&mut self, record: Record) {
        let step = match record.get(STEP_KEY) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Record without scalar '{}' is dropped", STEP_KEY);
                return;
            }
        };

        for (k, v) in record.iter() {
            if k == STEP_KEY {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::Array1(data) => self.add_histogram(k, data, step),
            }
        }
    }

    fn flush(&mut self) {
        self.writer.flush();
    }
}

/// Summary of samples in the layout of a TensorBoard histogram.
#[derive(Debug, PartialEq)]
struct Histogram {
    min: f64,
    max: f64,
    num: f64,
    sum: f64,
    sum_squares: f64,
    bucket_limits: Vec<f64>,
    bucket_counts: Vec<f64>,
}

impl Histogram {
    /// Non-finite samples are skipped. Returns `None` when no sample is left.
    fn new(data: &[f32], n_buckets: usize) -> Option<Self> {
        let data = data
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f64)
            .collect::<Vec<_>>();
        if data.is_empty() {
            return None;
        }
        let min = data.iter().cloned().fold(f64::MAX, f64::min);
        let max = data.iter().cloned().fold(f64::MIN, f64::max);
        let num = data.len() as f64;
        let sum = data.iter().sum::<f64>();
        let sum_squares = data.iter().map(|v| v * v).sum::<f64>();

        let (bucket_limits, bucket_counts) = if max <= min {
            (vec![max], vec![num])
        } else {
            let width = (max - min) / n_buckets as f64;
            let limits = (1..=n_buckets)
                .map(|i| min + width * i as f64)
                .collect::<Vec<_>>();
            let mut counts = vec![0f64; n_buckets];
            for v in data.iter() {
                let ix = (((v - min) / width) as usize).min(n_buckets - 1);
                counts[ix] += 1.0;
            }
            (limits, counts)
        };

        Some(Self {
            min,
            max,
            num,
            sum,
            sum_squares,
            bucket_limits,
            bucket_counts,
        })
    }
}

#[cfg(test)]
mod test {
    use super::Histogram;

    #[test]
    fn test_histogram_counts_every_sample() {
        let data = [0.0f32, 0.1, 0.5, 0.9, 1.0];
        let h = Histogram::new(&data, 4).unwrap();
        assert_eq!(h.bucket_limits, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(h.bucket_counts, vec![2.0, 0.0, 1.0, 2.0]);
        assert_eq!(h.num, 5.0);
        assert_eq!(h.min, 0.0);
        assert_eq!(h.max, 1.0);
    }

    #[test]
    fn test_histogram_of_constant_samples() {
        let h = Histogram::new(&[2.0f32, 2.0, 2.0], 10).unwrap();
        assert_eq!(h.bucket_limits, vec![2.0]);
        assert_eq!(h.bucket_counts, vec![3.0]);
        assert_eq!(h.sum, 6.0);
        assert_eq!(h.sum_squares, 12.0);
    }

    #[test]
    fn test_histogram_without_finite_samples() {
        assert_eq!(Histogram::new(&[f32::NAN, f32::INFINITY], 10), None);
        assert_eq!(Histogram::new(&[], 10), None);

        let h = Histogram::new(&[f32::NAN, 1.0, 3.0], 2).unwrap();
        assert_eq!(h.num, 2.0);
        assert_eq!(h.bucket_counts, vec![1.0, 1.0]);
    }
}
