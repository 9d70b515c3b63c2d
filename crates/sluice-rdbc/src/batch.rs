//! Fixed-size batch streaming with in-flight filtering

use futures::Stream;

use crate::error::{Error, Result};
use crate::provision::Provisioner;
use crate::query::Query;
use crate::record::{Batch, Record, RecordDecoder};
use crate::stream::{LeasedCursor, StreamState, StreamStats};

/// Lazy stream of record batches over a single leased cursor.
///
/// Every batch holds exactly `batch_size` records except possibly the last.
/// Connection lifecycle is the same as [`crate::stream::RecordStream`].
pub struct BatchStream {
    cursor: LeasedCursor,
    decoder: RecordDecoder,
    batch_size: usize,
    stats: StreamStats,
}

impl std::fmt::Debug for BatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchStream")
            .field("sql", &self.cursor.query().sql())
            .field("batch_size", &self.batch_size)
            .field("state", &self.cursor.state())
            .field("stats", &self.stats)
            .finish()
    }
}

impl BatchStream {
    /// Create a batch stream.
    ///
    /// A `batch_size` of zero is rejected here, before any connection.
    pub fn new(
        provisioner: Provisioner,
        query: impl Into<Query>,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }

        Ok(Self {
            cursor: LeasedCursor::new(provisioner, query.into()),
            decoder: RecordDecoder::default(),
            batch_size,
            stats: StreamStats::default(),
        })
    }

    /// Use a custom decoder
    pub fn with_decoder(mut self, decoder: RecordDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.cursor.state()
    }

    /// Counters so far
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Next batch; `Ok(None)` once exhausted, failed or closed
    pub async fn next(&mut self) -> Result<Option<Batch>> {
        let rows = self.cursor.fetch_many(self.batch_size).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let records: Vec<Record> = rows.into_iter().map(|row| self.decoder.decode(row)).collect();
        let index = self.stats.batches as usize;
        self.stats.batches += 1;
        self.stats.records += records.len() as u64;

        Ok(Some(Batch::new(index, records)))
    }

    /// Stop early and release the connection
    pub fn close(&mut self) {
        self.cursor.close();
    }

    /// Keep only records matching `predicate`, batch by batch.
    ///
    /// Grouping is preserved: a batch with no matches comes out empty
    /// unless [`FilteredBatches::skip_empty`] is set.
    pub fn filter_batches<F>(self, predicate: F) -> FilteredBatches<F>
    where
        F: FnMut(&Record) -> bool + Send,
    {
        FilteredBatches {
            inner: self,
            predicate,
            skip_empty: false,
        }
    }

    /// Adapt into a [`futures::Stream`]; it ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(batch)) => Some((Ok(batch), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

/// Batches with a record predicate applied
pub struct FilteredBatches<F> {
    inner: BatchStream,
    predicate: F,
    skip_empty: bool,
}

impl<F> std::fmt::Debug for FilteredBatches<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredBatches")
            .field("inner", &self.inner)
            .field("skip_empty", &self.skip_empty)
            .finish()
    }
}

impl<F> FilteredBatches<F>
where
    F: FnMut(&Record) -> bool + Send,
{
    /// Drop batches left empty by the predicate
    pub fn skip_empty(mut self) -> Self {
        self.skip_empty = true;
        self
    }

    /// Current lifecycle state of the underlying stream
    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    /// Counters of the underlying stream (before filtering)
    pub fn stats(&self) -> StreamStats {
        self.inner.stats()
    }

    /// Next filtered batch
    pub async fn next(&mut self) -> Result<Option<Batch>> {
        loop {
            let Some(batch) = self.inner.next().await? else {
                return Ok(None);
            };

            let batch = batch.retain(&mut self.predicate);
            if self.skip_empty && batch.is_empty() {
                continue;
            }
            return Ok(Some(batch));
        }
    }

    /// Stop early and release the connection
    pub fn close(&mut self) {
        self.inner.close();
    }

    /// Adapt into a [`futures::Stream`]; it ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(batch)) => Some((Ok(batch), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

/// Stream `query` in batches of `batch_size` records
pub fn stream_batches(
    provisioner: &Provisioner,
    query: impl Into<Query>,
    batch_size: usize,
) -> Result<BatchStream> {
    BatchStream::new(provisioner.clone(), query, batch_size)
}
