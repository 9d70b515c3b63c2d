//! Streaming aggregation

use tracing::debug;

use crate::error::Result;
use crate::provision::Provisioner;
use crate::query::Query;
use crate::stream::RecordStream;

/// Running arithmetic mean over a sequence of values
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one value
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Values seen so far
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of values seen so far
    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Mean of the values seen, `0.0` when none were
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Extend<f64> for RunningMean {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

/// Mean of `field` over every record of `query`.
///
/// Rows are pulled one at a time and never buffered. NULLs are skipped; an
/// empty result gives `0.0`. Stream errors propagate unchanged.
///
/// # Errors
///
/// Besides the stream's own errors, `average` raises two kinds itself:
/// - [`Error::Schema`](crate::error::Error::Schema) when a record has no `field` column
/// - [`Error::TypeConversion`](crate::error::Error::TypeConversion) when a value is not numeric
pub async fn average(
    provisioner: &Provisioner,
    query: impl Into<Query>,
    field: &str,
) -> Result<f64> {
    let mut stream = RecordStream::new(provisioner.clone(), query);
    let mut mean = RunningMean::new();

    while let Some(record) = stream.next().await? {
        if let Some(value) = record.get_f64(field)? {
            mean.push(value);
        }
    }

    debug!(field, count = mean.count(), "Computed average");
    Ok(mean.mean())
}
