//! Measured Series
//!
//! A series is the ordered list of points measured for one benchmark in one
//! environment. Sizes are strictly increasing in insertion order, which is the
//! order the size range was traversed in.

use buildbench_core::BenchmarkPoint;
use thiserror::Error;

/// Errors from serializing or parsing a series
#[derive(Debug, Error)]
pub enum SeriesError {
    /// Reading or writing CSV failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialized CSV was not UTF-8
    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A size did not exceed the previous one
    #[error("Input size {got} does not follow {previous}; sizes must be strictly increasing")]
    OutOfOrder {
        /// Last recorded size
        previous: u64,
        /// Rejected size
        got: u64,
    },

    /// A value was negative or not finite
    #[error("Invalid value {value} for input size {input_size}; expected finite seconds >= 0")]
    InvalidValue {
        /// Size of the rejected point
        input_size: u64,
        /// Rejected value
        value: f64,
    },
}

/// Append-only, size-ordered sequence of points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<BenchmarkPoint>,
}

impl Series {
    /// Create an empty series
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point.
    ///
    /// # Panics
    ///
    /// Panics if `input_size` is not greater than the last recorded size, or
    /// if `metric_value` is negative or not finite. Both indicate a bug in the
    /// caller, not a measurement problem.
    pub fn record(&mut self, input_size: u64, metric_value: f64) {
        if let Err(e) = self.check(input_size, metric_value) {
            panic!("{}", e);
        }
        self.points.push(BenchmarkPoint::new(input_size, metric_value));
    }

    /// Append a point, returning an error instead of panicking on a bad point.
    pub fn try_record(&mut self, input_size: u64, metric_value: f64) -> Result<(), SeriesError> {
        self.check(input_size, metric_value)?;
        self.points.push(BenchmarkPoint::new(input_size, metric_value));
        Ok(())
    }

    fn check(&self, input_size: u64, metric_value: f64) -> Result<(), SeriesError> {
        if let Some(last) = self.points.last() {
            if input_size <= last.input_size() {
                return Err(SeriesError::OutOfOrder {
                    previous: last.input_size(),
                    got: input_size,
                });
            }
        }
        if !metric_value.is_finite() || metric_value < 0.0 {
            return Err(SeriesError::InvalidValue {
                input_size,
                value: metric_value,
            });
        }
        Ok(())
    }

    /// Recorded points in insertion order
    pub fn points(&self) -> &[BenchmarkPoint] {
        &self.points
    }

    /// Number of recorded points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest recorded size
    pub fn last_input_size(&self) -> Option<u64> {
        self.points.last().map(|p| p.input_size())
    }

    /// Serialize to CSV text with an `input_size,seconds` header.
    ///
    /// Does not modify the series; repeated calls return identical text.
    pub fn finalize(&self) -> Result<String, SeriesError> {
        let mut buf = Vec::new();
        crate::tabular::write_csv(self, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Parse text produced by [`Series::finalize`].
    pub fn from_csv(text: &str) -> Result<Self, SeriesError> {
        crate::tabular::parse_csv(text.as_bytes())
    }
}
