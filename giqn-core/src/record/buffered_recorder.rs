use super::{Record, Recorder};

/// Keeps records in memory.
///
/// This is used for inspecting telemetry in tests and short runs.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
}

impl BufferedRecorder {
    /// Construct the recorder.
    pub fn new() -> Self {
        Self { buf: Vec::default() }
    }

    /// Returns an iterator over the records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Returns the number of records written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::RecordValue;

    #[test]
    fn test_buffered_recorder_keeps_order() {
        let mut recorder = BufferedRecorder::new();
        for i in 0..3 {
            recorder.write(Record::from_slice(&[(
                "opt_steps",
                RecordValue::Scalar(i as f32),
            )]));
        }
        let steps = recorder
            .iter()
            .map(|r| r.get_scalar("opt_steps").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(steps, vec![0.0, 1.0, 2.0]);
    }
}
