//! This module contains facilities for parsing the data contained in the "cpu"
//! lines of /proc/stat.

use serde::Serialize;
use std::fmt;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;


/// Identifier of a line of CPU statistics
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum CpuId {
    /// Aggregate statistics of all CPUs ("cpu" header)
    All,

    /// Statistics of one hardware thread ("cpuN" header)
    Core(u32),
}
//
impl CpuId {
    /// Identify the CPU associated with a /proc/stat header, if any
    pub(super) fn from_header(header: &str) -> Option<Self> {
        let suffix = header.strip_prefix("cpu")?;
        if suffix.is_empty() {
            Some(CpuId::All)
        } else if suffix.bytes().all(|b| b.is_ascii_digit()) {
            suffix.parse().ok().map(CpuId::Core)
        } else {
            None
        }
    }
}
//
impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CpuId::All => write!(f, "cpu"),
            CpuId::Core(index) => write!(f, "cpu{}", index),
        }
    }
}


/// The amount of time that a CPU spent in various states, in clock ticks
///
/// Clock ticks (aka jiffies) are 1/USER_HZ seconds, where USER_HZ is given by
/// `ticks_per_second()`. Timers which were introduced after Linux 2.6 are
/// optional, and absent if the kernel does not provide them. The same type
/// is used for increments between two samples.
///
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CpuTimes {
    /// Which CPU these statistics are about
    pub id: CpuId,

    /// Time spent in user mode
    pub user: u64,

    /// Time spent in user mode with low priority (nice)
    pub nice: u64,

    /// Time spent in system (aka kernel) mode
    pub system: u64,

    /// Time spent in the idle task (should match second entry in /proc/uptime)
    pub idle: u64,

    /// Time spent waiting for IO to complete (since Linux 2.5.41). Unreliable:
    /// the kernel documents that it can go backwards.
    pub iowait: Option<u64>,

    /// Time spent servicing hardware interrupts (since Linux 2.6.0-test4)
    pub irq: Option<u64>,

    /// Time spent servicing softirqs (since Linux 2.6.0-test4)
    pub softirq: Option<u64>,

    /// "Stolen" time spent in other operating systems when running in a
    /// virtualized environment (since Linux 2.6.11)
    pub steal: Option<u64>,

    /// Time spent running a virtual CPU for guest OSs (since Linux 2.6.24).
    /// This is already accounted for in the user time.
    pub guest: Option<u64>,

    /// Time spent running a niced guest (see above, since Linux 2.6.33)
    pub guest_nice: Option<u64>,
}
//
impl CpuTimes {
    /// Total amount of accounted time. Guest time is not counted twice.
    pub fn total(&self) -> u64 {
        [self.user, self.nice, self.system, self.idle]
            .iter()
            .chain([self.iowait, self.irq, self.softirq, self.steal]
                       .iter()
                       .flatten())
            .fold(0u64, |acc, &ticks| acc.saturating_add(ticks))
    }

    /// Amount of time which was not spent idle or waiting for I/O
    pub fn busy(&self) -> u64 {
        self.total()
            .saturating_sub(self.idle)
            .saturating_sub(self.iowait.unwrap_or(0))
    }
}
//
impl fmt::Display for CpuTimes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: user {}, nice {}, system {}, idle {}",
               self.id, self.user, self.nice, self.system, self.idle)?;
        if let Some(iowait) = self.iowait {
            write!(f, ", iowait {}", iowait)?;
        }
        write!(f, " ticks")
    }
}


/// Parse the columns of a cpu line, after the header
pub(super) fn parse<'a, I>(id: CpuId, mut columns: I) -> Result<CpuTimes, ParseError>
    where I: Iterator<Item = &'a str>
{
    // This is how we parse the next timer from the input (if any)
    let mut next_timer = |name: &str| -> Result<Option<u64>, ParseError> {
        match columns.next() {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                ParseError::invalid(format!("{}.{}", id, name), raw)
            }),
        }
    };

    // Timers which all kernels provide
    let mut required_timer = |name: &str| -> Result<u64, ParseError> {
        next_timer(name)?.ok_or_else(|| {
            ParseError::missing(format!("{}.{}", id, name))
        })
    };
    let user = required_timer("user")?;
    let nice = required_timer("nice")?;
    let system = required_timer("system")?;
    let idle = required_timer("idle")?;

    // Timers which depend on the kernel version. Columns past guest_nice
    // belong to kernels newer than this code, and are ignored.
    Ok(CpuTimes {
        id,
        user,
        nice,
        system,
        idle,
        iowait: next_timer("iowait")?,
        irq: next_timer("irq")?,
        softirq: next_timer("softirq")?,
        steal: next_timer("steal")?,
        guest: next_timer("guest")?,
        guest_nice: next_timer("guest_nice")?,
    })
}


/// Compute the increments of the timers of one CPU
///
/// A decreasing iowait timer is clamped to a zero increment, other timers
/// going backwards are reported as a counter reset.
pub(super) fn delta(previous: &CpuTimes,
                    current: &CpuTimes) -> Result<CpuTimes, CounterReset> {
    let id = current.id;
    let name = |field: &str| format!("{}.{}", id, field);
    let optional = |field: &str, previous: Option<u64>, current: Option<u64>| {
        delta::optional_counter(name(field), previous, current)
    };
    Ok(CpuTimes {
        id,
        user: delta::counter(name("user"), previous.user, current.user)?,
        nice: delta::counter(name("nice"), previous.nice, current.nice)?,
        system: delta::counter(name("system"), previous.system, current.system)?,
        idle: delta::counter(name("idle"), previous.idle, current.idle)?,
        // Not monotonic, see Documentation/filesystems/proc.rst
        iowait: match (previous.iowait, current.iowait) {
            (Some(previous), Some(current)) => Some(current.saturating_sub(previous)),
            _ => None,
        },
        irq: optional("irq", previous.irq, current.irq)?,
        softirq: optional("softirq", previous.softirq, current.softirq)?,
        steal: optional("steal", previous.steal, current.steal)?,
        guest: optional("guest", previous.guest, current.guest)?,
        guest_nice: optional("guest_nice", previous.guest_nice, current.guest_nice)?,
    })
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::ParseError;
    use crate::splitter::split_line_and_run;
    use super::{CpuId, CpuTimes};

    /// Check that CPU headers are recognized
    #[test]
    fn cpu_headers() {
        assert_eq!(CpuId::from_header("cpu"), Some(CpuId::All));
        assert_eq!(CpuId::from_header("cpu0"), Some(CpuId::Core(0)));
        assert_eq!(CpuId::from_header("cpu127"), Some(CpuId::Core(127)));
        assert_eq!(CpuId::from_header("cpux"), None);
        assert_eq!(CpuId::from_header("cpu+1"), None);
        assert_eq!(CpuId::from_header("intr"), None);
        assert_eq!(CpuId::Core(3).to_string(), "cpu3");
        assert_eq!(CpuId::All.to_string(), "cpu");
    }

    /// Check that parsing CPU statistics works as expected
    #[test]
    fn parse_cpu_stat() {
        // Oldest known CPU stats format from Linux 4.11's man proc
        let oldest = split_line_and_run("165 18 96 1", |columns| {
            super::parse(CpuId::All, columns)
        }).expect("Old CPU stats should parse");
        assert_eq!((oldest.user, oldest.nice, oldest.system, oldest.idle),
                   (165, 18, 96, 1));
        assert_eq!(oldest.iowait, None);
        assert_eq!(oldest.guest_nice, None);

        // First known CPU stats extension from Linux 4.11's man proc
        let first_ext = split_line_and_run("9 698 6521 151 56", |columns| {
            super::parse(CpuId::Core(1), columns)
        }).expect("Extended CPU stats should parse");
        assert_eq!(first_ext.iowait, Some(56));
        assert_eq!(first_ext.irq, None);

        // Newest known CPU stats format from Linux 4.11's man proc, plus one
        // column from the future
        let latest = split_line_and_run("18 9616 11 941 5 51 9 615 62 14 7",
                                        |columns| {
            super::parse(CpuId::Core(2), columns)
        }).expect("Complete CPU stats should parse");
        assert_eq!(latest, CpuTimes {
            id: CpuId::Core(2),
            user: 18,
            nice: 9616,
            system: 11,
            idle: 941,
            iowait: Some(5),
            irq: Some(51),
            softirq: Some(9),
            steal: Some(615),
            guest: Some(62),
            guest_nice: Some(14),
        });
        assert_eq!(latest.total(), 18 + 9616 + 11 + 941 + 5 + 51 + 9 + 615);
        assert_eq!(latest.busy(), 18 + 9616 + 11 + 51 + 9 + 615);
    }

    /// Check that broken CPU statistics are reported with the CPU name
    #[test]
    fn broken_cpu_stat() {
        assert_eq!(split_line_and_run("1 2 3", |columns| {
                       super::parse(CpuId::Core(3), columns)
                   }),
                   Err(ParseError::missing("cpu3.idle")));
        assert_eq!(split_line_and_run("1 2 3 4 x", |columns| {
                       super::parse(CpuId::All, columns)
                   }),
                   Err(ParseError::invalid("cpu.iowait", "x")));
    }

    /// Check CPU timer increments
    #[test]
    fn cpu_delta() {
        let parse = |line| split_line_and_run(line, |columns| {
            super::parse(CpuId::Core(0), columns)
        }).expect("CPU stats should parse");
        let before = parse("10 10 10 10 10 10");
        let after = parse("15 10 12 20 7 11");
        let delta = super::delta(&before, &after)
                         .expect("No counter went backwards");
        assert_eq!((delta.user, delta.nice, delta.system, delta.idle),
                   (5, 0, 2, 10));
        assert_eq!(delta.iowait, Some(0));
        assert_eq!(delta.irq, Some(1));
        assert_eq!(delta.softirq, None);

        let reset = super::delta(&after, &before)
                         .expect_err("User time went backwards");
        assert_eq!(reset.counter, "cpu0.user");
    }
}
