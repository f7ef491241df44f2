//! Timing Wrapper
//!
//! `buildbench time -- <cmd...>` is meant to be installed as the build
//! system's compiler launcher. It runs the command with inherited stdio and
//! prints the markers the harness extracts:
//!
//! ```text
//! [command line: c++ -std=c++14 -c measure.cpp -o measure.o]
//! [compilation time: 1.482913]
//! ```

use buildbench_core::{MetricTag, format_marker};
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::Command;
use std::time::{Duration, Instant};

/// A finished timed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timed {
    /// Exit code to propagate; `128 + signal` when killed by a signal
    pub exit_code: i32,
    /// Wall-clock time between spawn and exit
    pub elapsed: Duration,
}

/// Run `command` and measure its wall-clock time.
pub fn run_timed(command: &[String]) -> std::io::Result<Timed> {
    let (program, args) = command.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "no command to time")
    })?;

    let start = Instant::now();
    let status = Command::new(program).args(args).status()?;
    let elapsed = start.elapsed();

    let exit_code = status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1);
    Ok(Timed { exit_code, elapsed })
}

/// Write the `[command line: ...]` and timing markers for a finished command.
pub fn write_markers<W: Write>(
    mut out: W,
    command: &[String],
    tag: MetricTag,
    timed: &Timed,
) -> std::io::Result<()> {
    writeln!(out, "[command line: {}]", command.join(" "))?;
    writeln!(out, "{}", format_marker(tag, timed.elapsed.as_secs_f64()))?;
    out.flush()
}
