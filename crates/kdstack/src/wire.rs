//! The `kd-stack` text record format.
//!
//! ```text
//! kd-stack@<timestamp>!<thread_id>!<start_frame>!<finish_flag>!<name>!<name>!...!
//! ```
//!
//! A stack too long for one record is split into continuation records
//! (`finish_flag = 0`) followed by exactly one final record (`finish_flag = 1`).
//! All records of one stack share `(timestamp, thread_id)` and arrive in order.

use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

use crate::frame::ThreadId;

pub const RECORD_PREFIX: &str = "kd-stack@";
pub const SEPARATOR: char = '!';
/// A pending chunk is flushed before it would grow past this many bytes.
pub const CHUNK_THRESHOLD: usize = 950;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireRecord {
    pub timestamp: u64,
    pub thread_id: ThreadId,
    /// Index of the first frame in this chunk, counted from the leaf.
    pub start_frame: usize,
    pub finished: bool,
    /// Frame names, each terminated by `SEPARATOR`.
    pub stack: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("record does not start with `kd-stack@`")]
    MissingPrefix,
    #[error("record is missing the `{0}` field")]
    MissingField(&'static str),
    #[error("invalid `{field}` field: {source}")]
    InvalidNumber {
        field: &'static str,
        source: ParseIntError,
    },
    #[error("invalid finish flag `{0}`")]
    InvalidFinishFlag(String),
    #[error("chunk for ({timestamp}, {thread_id}) starts at frame {actual}, expected {expected}")]
    UnexpectedStartFrame {
        timestamp: u64,
        thread_id: ThreadId,
        expected: usize,
        actual: usize,
    },
}

impl WireRecord {
    pub fn frame_names(&self) -> impl Iterator<Item = &str> {
        self.stack
            .strip_suffix(SEPARATOR)
            .into_iter()
            .flat_map(|s| s.split(SEPARATOR))
    }
}

impl fmt::Display for WireRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{RECORD_PREFIX}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.timestamp,
            self.thread_id,
            self.start_frame,
            u8::from(self.finished),
            self.stack
        )
    }
}

impl FromStr for WireRecord {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim_end_matches(['\n', '\r'])
            .strip_prefix(RECORD_PREFIX)
            .ok_or(WireError::MissingPrefix)?;
        let mut fields = body.splitn(5, SEPARATOR);

        let timestamp = parse_field(fields.next(), "timestamp")?;
        let thread_id = parse_field(fields.next(), "thread_id")?;
        let start_frame = parse_field(fields.next(), "start_frame")?;
        let finished = match fields.next() {
            Some("0") => false,
            Some("1") => true,
            Some(other) => return Err(WireError::InvalidFinishFlag(other.to_owned())),
            None => return Err(WireError::MissingField("finish_flag")),
        };
        let stack = fields
            .next()
            .ok_or(WireError::MissingField("stack"))?
            .to_owned();

        Ok(WireRecord {
            timestamp,
            thread_id,
            start_frame,
            finished,
            stack,
        })
    }
}

fn parse_field<T>(field: Option<&str>, name: &'static str) -> Result<T, WireError>
where
    T: FromStr<Err = ParseIntError>,
{
    field
        .ok_or(WireError::MissingField(name))?
        .parse()
        .map_err(|source| WireError::InvalidNumber {
            field: name,
            source,
        })
}

/// A stack rebuilt from all of its chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReassembledStack {
    pub timestamp: u64,
    pub thread_id: ThreadId,
    pub frames: Vec<String>,
}

/// Downstream consumer that stitches chunked records back into whole stacks.
#[derive(Debug, Default)]
pub struct StackReassembler {
    pending: HashMap<(u64, ThreadId), Vec<String>>,
}

impl StackReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one record in arrival order. Returns the complete stack once its final chunk lands.
    pub fn push(&mut self, record: WireRecord) -> Result<Option<ReassembledStack>, WireError> {
        let key = (record.timestamp, record.thread_id);
        let received = self.pending.get(&key).map_or(0, Vec::len);
        if record.start_frame != received {
            return Err(WireError::UnexpectedStartFrame {
                timestamp: record.timestamp,
                thread_id: record.thread_id,
                expected: received,
                actual: record.start_frame,
            });
        }

        let frames = self.pending.entry(key).or_default();
        frames.extend(record.frame_names().map(str::to_owned));

        if !record.finished {
            return Ok(None);
        }
        let frames = self.pending.remove(&key).unwrap_or_default();
        Ok(Some(ReassembledStack {
            timestamp: record.timestamp,
            thread_id: record.thread_id,
            frames,
        }))
    }

    /// Number of stacks still waiting for their final chunk.
    pub fn incomplete(&self) -> usize {
        self.pending.len()
    }
}
