//! Record persistence.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::record::Record;

/// Identifier assigned to a stored record.
pub type RecordId = u64;

/// Why a record could not be persisted.
///
/// The logger returns it unchanged as [`Error::Sink`](crate::Error::Sink).
///
/// # Examples
///
/// ```
/// use audit_core::{SinkError, SinkErrorKind};
///
/// let error = SinkError::with_message(SinkErrorKind::Io, "disk full");
/// assert_eq!(error.kind(), SinkErrorKind::Io);
/// assert_eq!(error.to_string(), "record not stored (I/O error): disk full");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    kind: SinkErrorKind,
    message: Option<String>,
}

impl SinkError {
    /// Creates an error of `kind` with no detail.
    pub fn new(kind: SinkErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates an error of `kind` with a detail message from the store.
    pub fn with_message(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// Returns what kind of persistence failure this is.
    pub fn kind(&self) -> SinkErrorKind {
        self.kind
    }

    /// Returns the store's detail message, if it gave one.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(detail) => write!(f, "record not stored ({}): {}", self.kind, detail),
            None => write!(f, "record not stored ({})", self.kind),
        }
    }
}

impl std::error::Error for SinkError {}

/// Category of a [`SinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    /// I/O error occurred while writing.
    Io,
    /// Sink has reached capacity.
    Full,
    /// Record could not be encoded.
    Encode,
    /// Store refused the record.
    Rejected,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Full => write!(f, "sink full"),
            Self::Encode => write!(f, "encoding failed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Persistent store for assembled records.
///
/// Implementations own durability. Errors are handed back to the caller
/// unchanged; nothing is retried.
pub trait RecordSink: Send + Sync {
    /// Stores a record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the record could not be stored.
    fn insert(&self, record: Record) -> Result<RecordId, SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for std::sync::Arc<S> {
    fn insert(&self, record: Record) -> Result<RecordId, SinkError> {
        (**self).insert(record)
    }
}

/// Keeps records in memory, assigning ids from 1.
///
/// # Examples
///
/// ```
/// use audit_core::{MemorySink, SinkErrorKind};
///
/// let sink = MemorySink::with_capacity(0);
/// assert!(sink.is_empty());
/// assert_eq!(sink.capacity(), Some(0));
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
    capacity: Option<usize>,
}

impl MemorySink {
    /// Creates an unbounded sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that refuses records beyond `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            capacity: Some(capacity),
        }
    }

    /// Returns the capacity limit, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Provides borrowed access to the stored records.
    pub fn with_records<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[Record]) -> R,
    {
        f(&self.lock())
    }

    /// Returns a snapshot of the stored records.
    ///
    /// This clones every record. Prefer [`with_records`](Self::with_records)
    /// for reads.
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Consumes the sink and returns the stored records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for MemorySink {
    fn insert(&self, record: Record) -> Result<RecordId, SinkError> {
        let mut records = self.lock();

        if let Some(capacity) = self.capacity {
            if records.len() >= capacity {
                return Err(SinkError::with_message(
                    SinkErrorKind::Full,
                    format!("capacity of {} records reached", capacity),
                ));
            }
        }

        records.push(record);
        Ok(records.len() as RecordId)
    }
}

/// Writes each record as one line of JSON.
///
/// Ids count the lines written by this sink, starting at 1.
pub struct JsonLinesSink<W> {
    state: Mutex<LineState<W>>,
}

struct LineState<W> {
    writer: W,
    written: RecordId,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(LineState { writer, written: 0 }),
        }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn insert(&self, record: Record) -> Result<RecordId, SinkError> {
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| SinkError::with_message(SinkErrorKind::Encode, e.to_string()))?;
        line.push(b'\n');

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = &mut state.writer;
        writer
            .write_all(&line)
            .and_then(|()| writer.flush())
            .map_err(|e| SinkError::with_message(SinkErrorKind::Io, e.to_string()))?;

        state.written += 1;
        Ok(state.written)
    }
}

impl<W> fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}
