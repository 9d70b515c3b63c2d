//! Row-at-a-time record streaming
//!
//! [`RecordStream`] is a pull-based state machine over one leased cursor:
//!
//! ```text
//! Pending --next()--> Open --cursor empty--> Exhausted
//!                      |  \--fetch error---> Failed
//!                      \----close()/drop---> Closed
//! ```
//!
//! The lease is acquired on the first `next()` and released on every
//! transition out of `Open`. Terminal states answer `Ok(None)` forever.

use futures::Stream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provision::{ConnectionLease, Provisioner};
use crate::query::Query;
use crate::record::{Record, RecordDecoder};
use crate::types::Row;

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Nothing pulled yet, no connection held
    Pending,
    /// Cursor open, connection held
    Open,
    /// Every row was delivered
    Exhausted,
    /// Terminated by an error
    Failed,
    /// Closed by the consumer before exhaustion
    Closed,
}

impl StreamState {
    /// Whether the stream will never yield again
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed | Self::Closed)
    }
}

/// Per-stream counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Records handed to the consumer
    pub records: u64,
    /// Batches or pages handed to the consumer
    pub batches: u64,
}

/// One query's cursor on its own lease, shared by the row and batch streams
pub(crate) struct LeasedCursor {
    provisioner: Provisioner,
    query: Query,
    lease: Option<ConnectionLease>,
    state: StreamState,
}

impl LeasedCursor {
    pub(crate) fn new(provisioner: Provisioner, query: Query) -> Self {
        Self {
            provisioner,
            query,
            lease: None,
            state: StreamState::Pending,
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    async fn open(&mut self) -> Result<()> {
        let mut lease = self.provisioner.acquire().await?;
        lease.execute(&self.query).await?;
        self.lease = Some(lease);
        Ok(())
    }

    /// Make sure the cursor is open; `Ok(false)` once terminal
    async fn ensure_open(&mut self) -> Result<bool> {
        match self.state {
            StreamState::Open => Ok(true),
            StreamState::Pending => match self.open().await {
                Ok(()) => {
                    self.state = StreamState::Open;
                    Ok(true)
                }
                Err(e) => {
                    self.finish(StreamState::Failed);
                    Err(e)
                }
            },
            _ => Ok(false),
        }
    }

    fn lease_mut(&mut self) -> Result<&mut ConnectionLease> {
        self.lease
            .as_mut()
            .ok_or_else(|| Error::connection("connection already released"))
    }

    pub(crate) async fn fetch_one(&mut self) -> Result<Option<Row>> {
        if !self.ensure_open().await? {
            return Ok(None);
        }

        let fetched = match self.lease_mut() {
            Ok(lease) => lease.fetch_one().await,
            Err(e) => Err(e),
        };

        match fetched {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.finish(StreamState::Exhausted);
                Ok(None)
            }
            Err(e) => {
                self.finish(StreamState::Failed);
                Err(e)
            }
        }
    }

    /// Fetch up to `size` rows; an empty vector means the cursor is done
    pub(crate) async fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>> {
        if !self.ensure_open().await? {
            return Ok(Vec::new());
        }

        let fetched = match self.lease_mut() {
            Ok(lease) => lease.fetch_many(size).await,
            Err(e) => Err(e),
        };

        match fetched {
            Ok(rows) if rows.is_empty() => {
                self.finish(StreamState::Exhausted);
                Ok(rows)
            }
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.finish(StreamState::Failed);
                Err(e)
            }
        }
    }

    pub(crate) fn close(&mut self) {
        if !self.state.is_terminal() {
            self.finish(StreamState::Closed);
        }
    }

    fn finish(&mut self, state: StreamState) {
        self.state = state;
        if let Some(lease) = self.lease.take() {
            debug!(lease_id = lease.id(), state = ?state, "Cursor finished");
            lease.release();
        }
    }
}

/// Lazy, forward-only stream of decoded records.
///
/// Each `next()` pulls exactly one row from the cursor.
pub struct RecordStream {
    cursor: LeasedCursor,
    decoder: RecordDecoder,
    stats: StreamStats,
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("sql", &self.cursor.query().sql())
            .field("state", &self.cursor.state())
            .field("stats", &self.stats)
            .finish()
    }
}

impl RecordStream {
    /// Create a stream; no connection is opened until the first `next()`
    pub fn new(provisioner: Provisioner, query: impl Into<Query>) -> Self {
        Self {
            cursor: LeasedCursor::new(provisioner, query.into()),
            decoder: RecordDecoder::default(),
            stats: StreamStats::default(),
        }
    }

    /// Use a custom decoder
    pub fn with_decoder(mut self, decoder: RecordDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.cursor.state()
    }

    /// Counters so far
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Next record; `Ok(None)` once exhausted, failed or closed
    pub async fn next(&mut self) -> Result<Option<Record>> {
        match self.cursor.fetch_one().await? {
            Some(row) => {
                self.stats.records += 1;
                Ok(Some(self.decoder.decode(row)))
            }
            None => Ok(None),
        }
    }

    /// Stop early and release the connection
    pub fn close(&mut self) {
        self.cursor.close();
    }

    /// Adapt into a [`futures::Stream`]; it ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(record)) => Some((Ok(record), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

/// Stream every row of `query`, one record at a time
pub fn stream_rows(provisioner: &Provisioner, query: impl Into<Query>) -> RecordStream {
    RecordStream::new(provisioner.clone(), query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!StreamState::Pending.is_terminal());
        assert!(!StreamState::Open.is_terminal());
        assert!(StreamState::Exhausted.is_terminal());
        assert!(StreamState::Failed.is_terminal());
        assert!(StreamState::Closed.is_terminal());
    }
}
