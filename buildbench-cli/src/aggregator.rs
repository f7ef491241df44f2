//! Series Aggregation with Progress

use buildbench_report::Series;
use indicatif::ProgressBar;

/// Observer of measurement progress
pub trait ProgressSink {
    /// `done` of `total` sizes measured; the last one was `input_size`
    fn advance(&self, done: usize, total: usize, input_size: u64);

    /// Pipeline finished with the given label
    fn finish(&self, _message: &str) {}
}

/// [`ProgressSink`] that ignores every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _done: usize, _total: usize, _input_size: u64) {}
}

impl ProgressSink for ProgressBar {
    fn advance(&self, done: usize, total: usize, input_size: u64) {
        self.set_length(total as u64);
        self.set_position(done as u64);
        self.set_message(format!("size {}", input_size));
    }

    fn finish(&self, message: &str) {
        self.finish_with_message(message.to_string());
    }
}

/// Series plus the number of sizes planned for it
pub struct SeriesAggregator<'p> {
    series: Series,
    total: usize,
    progress: &'p dyn ProgressSink,
}

impl<'p> SeriesAggregator<'p> {
    /// Start an empty series of `total` planned points
    pub fn new(total: usize, progress: &'p dyn ProgressSink) -> Self {
        Self {
            series: Series::new(),
            total,
            progress,
        }
    }

    /// Record a point and report progress.
    ///
    /// # Panics
    ///
    /// Panics on the same conditions as [`Series::record`].
    pub fn record(&mut self, input_size: u64, metric_value: f64) {
        self.series.record(input_size, metric_value);
        self.progress.advance(self.series.len(), self.total, input_size);
    }

    /// Points recorded so far
    pub fn series(&self) -> &Series {
        &self.series
    }

    /// Planned number of points
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether every planned size was recorded
    pub fn is_complete(&self) -> bool {
        self.series.len() == self.total
    }

    /// Hand over the series
    pub fn into_series(self) -> Series {
        self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        updates: RefCell<Vec<(usize, usize, u64)>>,
    }

    impl ProgressSink for Recorder {
        fn advance(&self, done: usize, total: usize, input_size: u64) {
            self.updates.borrow_mut().push((done, total, input_size));
        }
    }

    #[test]
    fn test_progress_after_each_record() {
        let recorder = Recorder::default();
        let mut agg = SeriesAggregator::new(3, &recorder);
        agg.record(10, 0.1);
        agg.record(20, 0.2);
        assert!(!agg.is_complete());
        agg.record(30, 0.3);
        assert!(agg.is_complete());

        assert_eq!(
            *recorder.updates.borrow(),
            vec![(1, 3, 10), (2, 3, 20), (3, 3, 30)]
        );
        assert_eq!(agg.into_series().len(), 3);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_out_of_order_panics() {
        let mut agg = SeriesAggregator::new(2, &NoProgress);
        agg.record(2, 0.1);
        agg.record(1, 0.1);
    }

    #[test]
    fn test_progress_bar_sink() {
        let pb = ProgressBar::hidden();
        let mut agg = SeriesAggregator::new(4, &pb);
        agg.record(1, 0.5);
        assert_eq!(pb.position(), 1);
        assert_eq!(pb.length(), Some(4));
    }
}
