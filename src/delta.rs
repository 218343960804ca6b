//! Derivation of counter increments between two samples
//!
//! Many pseudo-files expose monotonic counters (CPU time, context switches,
//! I/O operations...), whose raw value means little on its own. What users
//! want is how much these counters increased between two samples, and how
//! fast. This module provides the common vocabulary for that.

use serde::Serialize;
use std::time::Duration;


/// Increments of a record's counters between two samples
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleDelta<D> {
    /// Time elapsed between the two samples (monotonic clock)
    pub elapsed: Duration,

    /// Counter increments, in the schema-specific delta type
    pub changes: D,
}
//
impl<D> SampleDelta<D> {
    /// Turn a counter increment into a per-second rate
    ///
    /// Returns None if no time elapsed between the samples, which can happen
    /// with coarse clocks when samples are taken back to back.
    pub fn rate(&self, increment: u64) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            Some(increment as f64 / secs)
        } else {
            None
        }
    }
}


/// A counter went backwards between two samples
///
/// This happens on 32-bit counter wraparound, when a device driver is
/// reloaded, or when a pid gets reused by another process. The increment is
/// then meaningless, so the sampler reports this instead and restarts
/// tracking from the new sample.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, thiserror::Error)]
#[error("counter {counter} went backwards from {previous} to {current}")]
pub struct CounterReset {
    /// Name of the counter, qualified like in ParseError (e.g. "cpu2.user")
    pub counter: String,

    /// Value in the previous sample
    pub previous: u64,

    /// Value in the current sample
    pub current: u64,
}


/// What sample_with_delta() can tell about counter increments:
///
/// - None if there is no previous sample to compare with, or if the previous
///   sample describes different entities (e.g. after a CPU hotplug)
/// - Some(Err) if a counter went backwards
/// - Some(Ok) with the increments otherwise
pub type DeltaSlot<D> = Option<Result<SampleDelta<D>, CounterReset>>;


/// Increment of a monotonic counter
pub(crate) fn counter(name: impl Into<String>,
                      previous: u64,
                      current: u64) -> Result<u64, CounterReset> {
    current.checked_sub(previous).ok_or_else(|| CounterReset {
        counter: name.into(),
        previous,
        current,
    })
}

/// Increment of a counter which may be missing from either sample. The
/// increment is only known if the counter is present in both.
pub(crate) fn optional_counter(name: impl Into<String>,
                               previous: Option<u64>,
                               current: Option<u64>)
                               -> Result<Option<u64>, CounterReset> {
    match (previous, current) {
        (Some(previous), Some(current)) => {
            counter(name, previous, current).map(Some)
        },
        _ => Ok(None),
    }
}

/// Increment of a monotonic duration, such as system uptime
pub(crate) fn duration(name: &str,
                       previous: Duration,
                       current: Duration) -> Result<Duration, CounterReset> {
    current.checked_sub(previous).ok_or_else(|| CounterReset {
        counter: name.to_owned(),
        previous: saturating_nanos(previous),
        current: saturating_nanos(current),
    })
}

/// INTERNAL: Express a duration in nanoseconds, saturating on overflow
fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
