//! Record destinations.
//!
//! A [`Sink`] is any `tracing_subscriber` [`MakeWriter`], type-erased and
//! cheap to clone so one factory can hand the same outputs to its own
//! dispatcher and to a process-wide subscriber.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Metadata;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt, OrElse, WithMaxLevel};
use tracing_subscriber::fmt::MakeWriter;

/// A shared destination for rendered log lines.
#[derive(Clone)]
pub struct Sink(Arc<BoxMakeWriter>);

impl Sink {
    /// Wrap any writer factory, e.g. `std::io::stdout` or a closure.
    pub fn new<M>(make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self(Arc::new(BoxMakeWriter::new(make_writer)))
    }

    /// Process standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout)
    }

    /// Process standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr)
    }

    /// Flush buffered output.
    pub fn flush(&self) -> io::Result<()> {
        self.0.make_writer().flush()
    }
}

impl<'a> MakeWriter<'a> for Sink {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.make_writer()
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.0.make_writer_for(meta)
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

impl From<MemorySink> for Sink {
    fn from(sink: MemorySink) -> Self {
        Sink::new(sink)
    }
}

/// Writer sending `error` events to `errors` and everything else to `routine`.
pub(crate) type SplitWriter = OrElse<WithMaxLevel<Sink>, Sink>;

pub(crate) fn split(routine: &Sink, errors: &Sink) -> SplitWriter {
    errors
        .clone()
        .with_max_level(tracing::Level::ERROR)
        .or_else(routine.clone())
}

/// In-memory sink that keeps every written byte.
///
/// Clones share the same buffer, so one handle can be given to a
/// [`LoggerFactory`](crate::LoggerFactory) while another inspects the output.
#[derive(Clone, Default, Debug)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as text.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Every complete line parsed as JSON. Lines that fail to parse are skipped.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemorySink {
    type Writer = MemorySink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_buffer() {
        let memory = MemorySink::new();
        let sink = Sink::from(memory.clone());

        sink.make_writer().write_all(b"{\"a\":1}\n").unwrap();
        sink.make_writer().write_all(b"not json\n").unwrap();
        sink.make_writer().write_all(b"{\"b\":2}\n").unwrap();

        let records = memory.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["b"], 2);

        memory.clear();
        assert!(memory.contents().is_empty());
    }
}
