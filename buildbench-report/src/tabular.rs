//! CSV Output
//!
//! One row per point, `input_size,seconds`, in series order.

use crate::series::{Series, SeriesError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Header columns of the CSV artifact
pub const CSV_HEADER: [&str; 2] = ["input_size", "seconds"];

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    input_size: u64,
    seconds: f64,
}

/// Write `series` as CSV to `writer`. The header is written even when the
/// series is empty.
pub fn write_csv<W: Write>(series: &Series, writer: W) -> Result<(), SeriesError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(CSV_HEADER)?;
    for point in series.points() {
        wtr.serialize(Row {
            input_size: point.input_size(),
            seconds: point.metric_value(),
        })?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Parse CSV written by [`write_csv`], validating the series invariants.
pub fn parse_csv<R: Read>(reader: R) -> Result<Series, SeriesError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut series = Series::new();
    for row in rdr.deserialize::<Row>() {
        let row = row?;
        series.try_record(row.input_size, row.seconds)?;
    }
    Ok(series)
}
