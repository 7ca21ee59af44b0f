use super::Record;

/// Writes a record to an output destination.
///
/// Writing must not feed back into training: a recorder only consumes the
/// values an agent has already computed.
pub trait Recorder {
    /// Write a record to the [`Recorder`].
    fn write(&mut self, record: Record);

    /// Flushes values written so far, if the destination is buffered.
    fn flush(&mut self) {}
}
