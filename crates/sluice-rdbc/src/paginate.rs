//! Offset-driven lazy pagination
//!
//! Each page is its own bounded query on its own lease:
//! `<query> LIMIT <page_size> OFFSET <offset>`, with both bound as
//! parameters after the caller's own. No connection is held between pages.
//!
//! The query must impose a deterministic order (e.g. `ORDER BY user_id`);
//! without one, rows may repeat or go missing across pages.
//!
//! The sequence ends on the first empty page, so a short final page is
//! followed by one more query.

use futures::Stream;
use tracing::debug;

use crate::dialect::{dialect_for_database, SqlDialect};
use crate::error::{Error, Result};
use crate::provision::Provisioner;
use crate::query::Query;
use crate::record::{Page, RecordDecoder};
use crate::stream::{StreamState, StreamStats};

/// Lazy sequence of pages
pub struct Paginator {
    provisioner: Provisioner,
    dialect: Box<dyn SqlDialect>,
    query: Query,
    decoder: RecordDecoder,
    page_size: usize,
    offset: u64,
    state: StreamState,
    stats: StreamStats,
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("dialect", &self.dialect.name())
            .field("sql", &self.query.sql())
            .field("page_size", &self.page_size)
            .field("offset", &self.offset)
            .field("state", &self.state)
            .finish()
    }
}

impl Paginator {
    /// Create a paginator starting at offset 0.
    ///
    /// The SQL dialect follows the provisioner's database type. A
    /// `page_size` of zero is rejected before any connection.
    pub fn new(
        provisioner: Provisioner,
        query: impl Into<Query>,
        page_size: usize,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::config("page_size must be at least 1"));
        }

        let dialect = dialect_for_database(provisioner.factory().database_type());
        Ok(Self {
            provisioner,
            dialect,
            query: query.into(),
            decoder: RecordDecoder::default(),
            page_size,
            offset: 0,
            state: StreamState::Pending,
            stats: StreamStats::default(),
        })
    }

    /// Override the SQL dialect
    pub fn with_dialect(mut self, dialect: Box<dyn SqlDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    /// Use a custom decoder
    pub fn with_decoder(mut self, decoder: RecordDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Resume from `offset` instead of 0
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Offset of the next page to fetch
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Configured page size
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn page_query(&self) -> Query {
        let sql = self
            .dialect
            .paged_sql(self.query.sql(), self.query.params().len());
        self.query
            .params()
            .iter()
            .cloned()
            .fold(Query::new(sql), |query, value| query.bind(value))
            .bind(self.page_size as u64)
            .bind(self.offset)
    }

    async fn fetch_page(&self) -> Result<Page> {
        let query = self.page_query();
        let mut lease = self.provisioner.acquire().await?;
        lease.execute(&query).await?;
        let rows = lease.fetch_many(self.page_size).await?;
        lease.release();

        let records = rows.into_iter().map(|row| self.decoder.decode(row)).collect();
        Ok(Page::new(self.offset, self.page_size, records))
    }

    /// Next page; `Ok(None)` after the first empty page, or after an error
    pub async fn next(&mut self) -> Result<Option<Page>> {
        if self.state.is_terminal() {
            return Ok(None);
        }
        self.state = StreamState::Open;

        let page = match self.fetch_page().await {
            Ok(page) => page,
            Err(e) => {
                self.state = StreamState::Failed;
                return Err(e);
            }
        };

        debug!(
            offset = self.offset,
            page_size = self.page_size,
            rows = page.len(),
            "Fetched page"
        );

        if page.is_empty() {
            self.state = StreamState::Exhausted;
            return Ok(None);
        }

        self.offset = page.next_offset();
        self.stats.batches += 1;
        self.stats.records += page.len() as u64;
        Ok(Some(page))
    }

    /// Stop paginating
    pub fn close(&mut self) {
        if !self.state.is_terminal() {
            self.state = StreamState::Closed;
        }
    }

    /// Adapt into a [`futures::Stream`]; it ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> + Send {
        futures::stream::unfold(self, |mut pages| async move {
            match pages.next().await {
                Ok(Some(page)) => Some((Ok(page), pages)),
                Ok(None) => None,
                Err(e) => Some((Err(e), pages)),
            }
        })
    }
}

/// Paginate `query` in pages of `page_size` records
pub fn lazy_paginate(
    provisioner: &Provisioner,
    query: impl Into<Query>,
    page_size: usize,
) -> Result<Paginator> {
    Paginator::new(provisioner.clone(), query, page_size)
}
