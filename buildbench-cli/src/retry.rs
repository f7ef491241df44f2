//! Stale-Build Retry
//!
//! A build tool that decides the target is up to date exits successfully
//! without compiling anything, so no timing marker is printed. The controller
//! re-invokes the same target (without regenerating the source) after a short
//! pause, up to a fixed budget.
//!
//! ```text
//!                 ┌──────── NotFound, retries < budget: sleep ────────┐
//!                 ▼                                                   │
//! AwaitingResult { retries } ── invoke ── extract ─────────────────────┘
//!        │                │                │
//!        │ Fatal          │ Found          │ NotFound, retries == budget
//!        ▼                ▼                ▼
//!    BuildError         Done           StaleBuild
//! ```

use crate::error::HarnessError;
use crate::invoker::BuildInvoker;
use buildbench_core::{Extraction, MetricTag, extract_metric};
use std::time::Duration;
use tracing::{debug, warn};

/// Bound on re-invocations after a build printed no marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-invocations allowed; a size is attempted at most `budget + 1` times
    pub budget: u32,
    /// Pause before each re-invocation
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: 10,
            delay: Duration::from_millis(200),
        }
    }
}

/// Source of the pause between attempts
pub trait Sleeper {
    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Result of one invoke-and-extract cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// Marker found with this value
    Found(f64),
    /// Build succeeded but printed no marker
    NotFound {
        /// Output that lacked the marker
        stdout: String,
    },
    /// Build failed
    Fatal(HarnessError),
}

/// Retry state of one measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryState {
    /// Waiting for a build that prints the marker
    AwaitingResult {
        /// Re-invocations made so far
        retries: u32,
    },
    /// Value obtained
    Done {
        /// Extracted seconds
        value: f64,
        /// Re-invocations it took
        retries: u32,
    },
}

/// A value obtained by the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measured {
    /// Seconds reported by the marker
    pub value: f64,
    /// Re-invocations it took
    pub retries: u32,
}

/// What is being measured, for diagnostics
#[derive(Debug, Clone, Copy)]
pub struct Attempt<'a> {
    /// Build target to invoke
    pub target: &'a str,
    /// Marker to look for in stdout
    pub tag: MetricTag,
    /// Size the source was generated for
    pub input_size: u64,
    /// Generated source, attached to fatal errors
    pub generated_source: &'a str,
}

/// Drives invocations until a marker is found or the budget runs out
pub struct RetryController<'s, S: Sleeper + ?Sized> {
    policy: RetryPolicy,
    sleeper: &'s S,
}

impl<'s, S: Sleeper + ?Sized> RetryController<'s, S> {
    /// Create a controller
    pub fn new(policy: RetryPolicy, sleeper: &'s S) -> Self {
        Self { policy, sleeper }
    }

    /// Policy in effect
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one invoke-and-extract cycle.
    pub fn cycle<I: BuildInvoker + ?Sized>(
        &self,
        invoker: &mut I,
        attempt: &Attempt<'_>,
    ) -> CycleOutcome {
        let result = invoker.invoke(attempt.target);
        if !result.is_success() {
            return CycleOutcome::Fatal(HarnessError::Build {
                target: attempt.target.to_string(),
                input_size: attempt.input_size,
                stderr: result.stderr,
                generated_source: attempt.generated_source.to_string(),
            });
        }
        match extract_metric(&result.stdout, attempt.tag) {
            Extraction::Found(value) => CycleOutcome::Found(value),
            Extraction::NotFound => CycleOutcome::NotFound {
                stdout: result.stdout,
            },
        }
    }

    /// Invoke `attempt.target` until its stdout carries the marker.
    ///
    /// Returns `StaleBuild` once `budget` re-invocations all came back without
    /// a marker, and `Build` on the first failed invocation.
    pub fn measure<I: BuildInvoker + ?Sized>(
        &self,
        invoker: &mut I,
        attempt: &Attempt<'_>,
    ) -> Result<Measured, HarnessError> {
        let mut state = RetryState::AwaitingResult { retries: 0 };
        loop {
            match state {
                RetryState::Done { value, retries } => return Ok(Measured { value, retries }),
                RetryState::AwaitingResult { retries } => {
                    state = self.step(invoker, attempt, retries)?;
                }
            }
        }
    }

    fn step<I: BuildInvoker + ?Sized>(
        &self,
        invoker: &mut I,
        attempt: &Attempt<'_>,
        retries: u32,
    ) -> Result<RetryState, HarnessError> {
        match self.cycle(invoker, attempt) {
            CycleOutcome::Found(value) => {
                debug!(
                    build_target = attempt.target,
                    input_size = attempt.input_size,
                    value,
                    retries,
                    "marker found"
                );
                Ok(RetryState::Done { value, retries })
            }
            CycleOutcome::Fatal(err) => Err(err),
            CycleOutcome::NotFound { stdout } => {
                if retries >= self.policy.budget {
                    return Err(HarnessError::StaleBuild {
                        target: attempt.target.to_string(),
                        input_size: attempt.input_size,
                        tag: attempt.tag.to_string(),
                        attempts: retries + 1,
                        last_stdout: stdout,
                        generated_source: attempt.generated_source.to_string(),
                    });
                }
                warn!(
                    build_target = attempt.target,
                    input_size = attempt.input_size,
                    retry = retries + 1,
                    budget = self.policy.budget,
                    "no [{}] marker in build output, build may be stale; retrying",
                    attempt.tag
                );
                self.sleeper.sleep(self.policy.delay);
                Ok(RetryState::AwaitingResult {
                    retries: retries + 1,
                })
            }
        }
    }
}
