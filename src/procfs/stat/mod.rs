//! This module contains a sampling parser for /proc/stat
//!
//! Courtesy of Linux's total lack of promises regarding the variability of
//! /proc/stat across hardware architectures, or even on a given system
//! depending on kernel configuration, every entry of the record is optional:
//! a file which only contains some of the lines still parses.

mod cpu;
mod interrupts;
mod paging;

pub use self::cpu::{CpuId, CpuTimes};
pub use self::interrupts::Interrupts;
pub use self::paging::Paging;

use chrono::{DateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;
use tracing::trace;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;
use crate::parser::{DeltaParser, PseudoFileParser};
use crate::pseudo_file::SchemaId;
use crate::splitter::SplitLinesBySpace;
use super::{next_column, parse_number};


/// Sampler for /proc/stat
pub type Sampler = crate::sampler::Sampler<Parser>;


lazy_static! {
    /// Number of CPU ticks from the statistics of /proc/stat in one second
    static ref TICKS_PER_SEC: u64 = {
        // The POSIX default is used if sysconf has no answer
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        u64::try_from(ticks).ok().filter(|&ticks| ticks > 0).unwrap_or(100)
    };
}

/// Number of clock ticks per second (USER_HZ), which is the unit of the CPU
/// timers of /proc/stat
pub fn ticks_per_second() -> u64 {
    *TICKS_PER_SEC
}


/// Parser for /proc/stat
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::Stat;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        let mut record = Record::default();
        let mut lines = SplitLinesBySpace::new(file_contents);
        while let Some(mut columns) = lines.next() {
            // Empty lines carry no data
            let header = match columns.next() {
                Some(header) => header,
                None => continue,
            };

            // Dispatch the line to the appropriate parser
            match LineKind::of(header) {
                LineKind::Cpu(id) => {
                    record.per_cpu.push(cpu::parse(id, columns)?);
                },
                LineKind::Paging => {
                    record.paging = Some(paging::parse(header, columns)?);
                },
                LineKind::Swapping => {
                    record.swapping = Some(paging::parse(header, columns)?);
                },
                LineKind::Interrupts => {
                    record.interrupts = Some(interrupts::parse(header, columns)?);
                },
                LineKind::SoftIrqs => {
                    record.softirqs = Some(interrupts::parse(header, columns)?);
                },
                LineKind::ContextSwitches => {
                    // Context switches happen rather frequently (up to 10k per
                    // second), so anything less than a 64-bit counter would be
                    // unwise for this quantity
                    record.context_switches = Some(scalar(header, columns)?);
                },
                LineKind::BootTime => {
                    // Boot times are provided in seconds since the UNIX epoch
                    let raw = next_column(&mut columns, header)?;
                    let seconds = parse_number::<i64>(header, raw)?;
                    let boot_time = Utc.timestamp_opt(seconds, 0)
                                       .single()
                                       .ok_or_else(|| ParseError::invalid(header, raw))?;
                    record.boot_time = Some(boot_time);
                },
                LineKind::ProcessForks => {
                    record.process_forks = Some(scalar(header, columns)?);
                },
                LineKind::ProcsRunning => {
                    record.procs_running = Some(scalar(header, columns)?);
                },
                LineKind::ProcsBlocked => {
                    record.procs_blocked = Some(scalar(header, columns)?);
                },
                LineKind::Unsupported => {
                    trace!(line = columns.line_number(), header,
                           "Skipping unsupported /proc/stat line");
                },
            }
        }
        Ok(record)
    }
}
//
impl DeltaParser for Parser {
    type Delta = Delta;

    /// Records can be compared if they list the same CPUs, in the same order,
    /// and the same interrupt sources
    fn compatible(previous: &Record, current: &Record) -> bool {
        let same_cpus =
            previous.per_cpu.len() == current.per_cpu.len() &&
            previous.per_cpu.iter()
                            .zip(&current.per_cpu)
                            .all(|(previous, current)| previous.id == current.id);
        let same_irqs = |previous: &Option<Interrupts>,
                         current: &Option<Interrupts>| {
            match (previous, current) {
                (Some(previous), Some(current)) => {
                    interrupts::compatible(previous, current)
                },
                _ => true,
            }
        };
        same_cpus &&
            same_irqs(&previous.interrupts, &current.interrupts) &&
            same_irqs(&previous.softirqs, &current.softirqs)
    }

    fn delta(previous: &Record, current: &Record) -> Result<Delta, CounterReset> {
        // Compute the increments of an optional per-line quantity
        fn both<T, R>(previous: &Option<T>,
                      current: &Option<T>,
                      delta: impl FnOnce(&T, &T) -> Result<R, CounterReset>)
                      -> Result<Option<R>, CounterReset> {
            match (previous, current) {
                (Some(previous), Some(current)) => delta(previous, current).map(Some),
                _ => Ok(None),
            }
        }

        Ok(Delta {
            per_cpu: previous.per_cpu.iter()
                                     .zip(&current.per_cpu)
                                     .map(|(previous, current)| cpu::delta(previous, current))
                                     .collect::<Result<_, _>>()?,
            interrupts: both(&previous.interrupts, &current.interrupts,
                             |p, c| interrupts::delta("intr", p, c))?,
            softirqs: both(&previous.softirqs, &current.softirqs,
                           |p, c| interrupts::delta("softirq", p, c))?,
            context_switches: delta::optional_counter("ctxt",
                                                      previous.context_switches,
                                                      current.context_switches)?,
            process_forks: delta::optional_counter("processes",
                                                   previous.process_forks,
                                                   current.process_forks)?,
            paging: both(&previous.paging, &current.paging,
                         |p, c| paging::delta("page", p, c))?,
            swapping: both(&previous.swapping, &current.swapping,
                           |p, c| paging::delta("swap", p, c))?,
            procs_running: current.procs_running,
            procs_blocked: current.procs_blocked,
        })
    }
}

/// INTERNAL: Parse a line holding a single number
fn scalar<'a, I>(header: &str, mut columns: I) -> Result<u64, ParseError>
    where I: Iterator<Item = &'a str>
{
    parse_number(header, next_column(&mut columns, header)?)
}


/// Kind of data held by a line of /proc/stat, as told by its header
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LineKind {
    /// Global or per-thread CPU stats ("cpu" or "cpuN")
    Cpu(CpuId),

    /// Paging and swapping statistics ("page" and "swap")
    Paging,
    Swapping,

    /// Hardware and software IRQ activity ("intr" and "softirq")
    Interrupts,
    SoftIrqs,

    /// Context switch counter ("ctxt")
    ContextSwitches,

    /// Boot time ("btime")
    BootTime,

    /// Total process forking activity ("processes")
    ProcessForks,

    /// Current process activity ("procs_running" and "procs_blocked")
    ProcsRunning,
    ProcsBlocked,

    /// Anything else, including the disk_io line of Linux 2.4
    Unsupported,
}
//
impl LineKind {
    /// Tell how a line should be parsed (if at all)
    fn of(header: &str) -> Self {
        match header {
            "page" => LineKind::Paging,
            "swap" => LineKind::Swapping,
            "intr" => LineKind::Interrupts,
            "softirq" => LineKind::SoftIrqs,
            "ctxt" => LineKind::ContextSwitches,
            "btime" => LineKind::BootTime,
            "processes" => LineKind::ProcessForks,
            "procs_running" => LineKind::ProcsRunning,
            "procs_blocked" => LineKind::ProcsBlocked,
            other => CpuId::from_header(other).map_or(LineKind::Unsupported,
                                                      LineKind::Cpu),
        }
    }
}


/// Contents of /proc/stat
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// CPU usage statistics, one entry per "cpu" line in file order. The first
    /// entry is normally the aggregate of all CPUs, followed by one entry per
    /// hardware thread.
    pub per_cpu: Vec<CpuTimes>,

    /// Statistics on the number of hardware interrupts that were serviced
    pub interrupts: Option<Interrupts>,

    /// Statistics on the number of softirqs that were serviced
    pub softirqs: Option<Interrupts>,

    /// Number of context switches that the system underwent since boot
    pub context_switches: Option<u64>,

    /// Boot time (second precision)
    pub boot_time: Option<DateTime<Utc>>,

    /// Number of forks since boot
    pub process_forks: Option<u64>,

    /// Number of processes in runnable state (since Linux 2.5.45)
    pub procs_running: Option<u64>,

    /// Number of processes blocked waiting for I/O (since Linux 2.5.45)
    pub procs_blocked: Option<u64>,

    /// Number of pages that the system paged in and out from disk, overall...
    pub paging: Option<Paging>,

    /// ...and narrowing it down to swapping activity in particular
    pub swapping: Option<Paging>,
}
//
impl Record {
    /// Aggregate statistics of all CPUs, if present
    pub fn all_cpus(&self) -> Option<&CpuTimes> {
        self.per_cpu.iter().find(|times| times.id == CpuId::All)
    }

    /// Statistics of individual hardware threads, in file order
    pub fn cores(&self) -> impl Iterator<Item = &CpuTimes> {
        self.per_cpu.iter().filter(|times| times.id != CpuId::All)
    }
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} CPUs", self.cores().count())?;
        if let Some(context_switches) = self.context_switches {
            write!(f, ", {} context switches", context_switches)?;
        }
        if let Some(process_forks) = self.process_forks {
            write!(f, ", {} forks", process_forks)?;
        }
        if let (Some(running), Some(blocked)) = (self.procs_running,
                                                 self.procs_blocked) {
            write!(f, ", {} running, {} blocked", running, blocked)?;
        }
        Ok(())
    }
}


/// Counter increments between two /proc/stat records
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Delta {
    /// CPU timer increments, in the same order as Record::per_cpu
    ///
    /// The iowait timer is the one exception to counter reset detection: the
    /// kernel lets it go backwards, so a decrease yields an increment of zero
    /// instead of a CounterReset.
    pub per_cpu: Vec<CpuTimes>,

    /// Hardware interrupts serviced in between
    pub interrupts: Option<Interrupts>,

    /// Softirqs serviced in between
    pub softirqs: Option<Interrupts>,

    /// Context switches in between
    pub context_switches: Option<u64>,

    /// Forks in between
    pub process_forks: Option<u64>,

    /// Pages moved between memory and disk in between
    pub paging: Option<Paging>,

    /// Pages swapped in and out in between
    pub swapping: Option<Paging>,

    /// Number of runnable processes, a gauge taken from the current record
    pub procs_running: Option<u64>,

    /// Number of processes blocked on I/O, a gauge taken from the current
    /// record
    pub procs_blocked: Option<u64>,
}
