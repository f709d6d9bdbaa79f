use std::io::Write;
use std::mem;
use std::sync::Mutex;

/// Receives fully formatted wire records.
///
/// Fire-and-forget: failures are the sink's own business and are never
/// retried or buffered by the caller.
pub trait Sink: Send + Sync {
    fn emit(&self, record: &str);
}

/// Writes one record per line to any `Write` (file, socket, stderr, ...).
#[derive(Debug)]
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn emit(&self, record: &str) {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(_) => {
                log::warn!("emit: Writer lock poisoned. Dropping record.");
                return;
            }
        };
        if let Err(err) = writeln!(writer, "{}", record) {
            log::warn!("emit: Failed to write record ({}). Dropping record.", err);
        }
    }
}

/// Forwards records to the `log` facade under the `kdstack::wire` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn emit(&self, record: &str) {
        log::info!(target: "kdstack::wire", "{}", record);
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns everything collected so far.
    pub fn take(&self) -> Vec<String> {
        match self.records.lock() {
            Ok(mut records) => mem::take(&mut *records),
            Err(poisoned) => mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Sink for MemorySink {
    fn emit(&self, record: &str) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(record.to_owned()),
        }
    }
}
