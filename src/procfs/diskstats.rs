//! This module contains a sampling parser for /proc/diskstats
//!
//! Each line of the file describes one block device (or partition), with its
//! device numbers, name and a growing set of I/O statistics. The kernel
//! documentation (Documentation/admin-guide/iostats.rst) lists these fields:
//!
//! - 11 "classic" fields, which are present since Linux 2.6.25
//! - 4 discard fields, since Linux 4.18
//! - 2 flush fields, since Linux 5.5
//!
//! Newer fields will be ignored until they are added here.
//!
//! Kernels older than 2.6.25 only printed 4 counters for partitions. Such
//! lines are rejected as lacking the writes_completed field, which fails
//! the whole file.

use serde::Serialize;
use std::fmt;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;
use crate::parser::{DeltaParser, PseudoFileParser};
use crate::pseudo_file::SchemaId;
use crate::splitter::SplitLinesBySpace;
use super::{next_column, parse_number};


/// Sampler for /proc/diskstats
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/diskstats
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::DiskStats;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        let mut disks = Vec::new();
        let mut lines = SplitLinesBySpace::new(file_contents);
        while let Some(mut columns) = lines.next() {
            // Device numbers come first, and identify the device
            let raw_major = match columns.next() {
                Some(raw_major) => raw_major,
                None => continue,
            };
            let major = parse_number::<u32>("major", raw_major)?;
            let minor = parse_number::<u32>("minor",
                                            next_column(&mut columns, "minor")?)?;
            let name = next_column(&mut columns, "name")?;
            disks.push(parse_counters(major, minor, name, columns)?);
        }
        Ok(Record { disks })
    }
}
//
impl DeltaParser for Parser {
    type Delta = Delta;

    fn compatible(previous: &Record, current: &Record) -> bool {
        previous.disks.len() == current.disks.len()
            && previous.disks.iter()
                             .zip(&current.disks)
                             .all(|(previous, current)| previous.same_device(current))
    }

    fn delta(previous: &Record, current: &Record) -> Result<Delta, CounterReset> {
        let disks = previous.disks.iter()
                                  .zip(&current.disks)
                                  .map(|(previous, current)| disk_delta(previous, current))
                                  .collect::<Result<Vec<_>, _>>()?;
        Ok(Delta { disks })
    }
}


/// Contents of /proc/diskstats
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// Block devices, in file order
    pub disks: Vec<DiskStats>,
}
//
impl Record {
    /// Look up a block device by name (e.g. "sda")
    pub fn get(&self, name: &str) -> Option<&DiskStats> {
        self.disks.iter().find(|disk| disk.name == name)
    }
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (sectors_read, sectors_written) =
            self.disks.iter().fold((0u64, 0u64), |(read, written), disk| {
                (read.saturating_add(disk.sectors_read),
                 written.saturating_add(disk.sectors_written))
            });
        write!(f, "{} block devices, {} sectors read, {} sectors written",
               self.disks.len(), sectors_read, sectors_written)
    }
}


/// I/O statistics of one block device
///
/// Sectors are 512 bytes, whatever the actual sector size of the device.
/// Times are in milliseconds. The same type is used for increments between
/// two samples, except for `ios_in_progress` which is a gauge.
///
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DiskStats {
    /// Major device number
    pub major: u32,

    /// Minor device number
    pub minor: u32,

    /// Device name
    pub name: String,

    /// Reads completed successfully
    pub reads_completed: u64,

    /// Adjacent reads which were merged together for efficiency
    pub reads_merged: u64,

    /// Sectors read successfully
    pub sectors_read: u64,

    /// Time spent reading
    pub time_reading_ms: u64,

    /// Writes completed successfully
    pub writes_completed: u64,

    /// Adjacent writes which were merged together for efficiency
    pub writes_merged: u64,

    /// Sectors written successfully
    pub sectors_written: u64,

    /// Time spent writing
    pub time_writing_ms: u64,

    /// I/Os currently in progress (gauge)
    pub ios_in_progress: u64,

    /// Time during which the device had I/Os in progress
    pub time_io_ms: u64,

    /// Weighted time spent doing I/Os, which also accounts for queue depth
    pub weighted_time_io_ms: u64,

    /// Discard statistics (since Linux 4.18)
    pub discards: Option<Discards>,

    /// Flush statistics (since Linux 5.5)
    pub flushes: Option<Flushes>,
}
//
impl DiskStats {
    /// Truth that two entries describe the same block device
    pub fn same_device(&self, other: &DiskStats) -> bool {
        (self.major, self.minor, &self.name) == (other.major, other.minor, &other.name)
    }
}
//
impl fmt::Display for DiskStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({}:{}): {} reads, {} writes, {} in progress",
               self.name, self.major, self.minor,
               self.reads_completed, self.writes_completed, self.ios_in_progress)
    }
}


/// Discard statistics of a block device
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Discards {
    /// Discards completed successfully
    pub completed: u64,

    /// Adjacent discards which were merged together
    pub merged: u64,

    /// Sectors discarded
    pub sectors: u64,

    /// Time spent discarding
    pub time_ms: u64,
}


/// Flush statistics of a block device
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Flushes {
    /// Flush requests completed successfully
    pub completed: u64,

    /// Time spent flushing
    pub time_ms: u64,
}


/// Increments of block device statistics between two samples
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Delta {
    /// Per-device increments, in file order
    pub disks: Vec<DiskStats>,
}


/// INTERNAL: Parse the statistics columns of a block device
///
/// All 11 classic counters are required, so the short partition lines of
/// pre-2.6.25 kernels are reported as missing fields.
fn parse_counters<'a, I>(major: u32,
                         minor: u32,
                         name: &str,
                         mut columns: I) -> Result<DiskStats, ParseError>
    where I: Iterator<Item = &'a str>
{
    // Counters are named after their device in errors
    let mut next_counter = |field: &str| -> Result<Option<u64>, ParseError> {
        match columns.next() {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                ParseError::invalid(format!("{}.{}", name, field), raw)
            }),
        }
    };
    let present = |field: &str, counter: Option<u64>| -> Result<u64, ParseError> {
        counter.ok_or_else(|| ParseError::missing(format!("{}.{}", name, field)))
    };
    let mut required = |field: &str| -> Result<u64, ParseError> {
        present(field, next_counter(field)?)
    };

    // The classic statistics, which all supported kernels provide
    let reads_completed = required("reads_completed")?;
    let reads_merged = required("reads_merged")?;
    let sectors_read = required("sectors_read")?;
    let time_reading_ms = required("time_reading_ms")?;
    let writes_completed = required("writes_completed")?;
    let writes_merged = required("writes_merged")?;
    let sectors_written = required("sectors_written")?;
    let time_writing_ms = required("time_writing_ms")?;
    let ios_in_progress = required("ios_in_progress")?;
    let time_io_ms = required("time_io_ms")?;
    let weighted_time_io_ms = required("weighted_time_io_ms")?;

    // Discard statistics come as a block, which may be absent
    let discards = match next_counter("discards.completed")? {
        None => None,
        Some(completed) => Some(Discards {
            completed,
            merged: present("discards.merged", next_counter("discards.merged")?)?,
            sectors: present("discards.sectors", next_counter("discards.sectors")?)?,
            time_ms: present("discards.time_ms", next_counter("discards.time_ms")?)?,
        }),
    };

    // Same for flush statistics
    let flushes = match next_counter("flushes.completed")? {
        None => None,
        Some(completed) => Some(Flushes {
            completed,
            time_ms: present("flushes.time_ms", next_counter("flushes.time_ms")?)?,
        }),
    };

    Ok(DiskStats {
        major,
        minor,
        name: name.to_owned(),
        reads_completed,
        reads_merged,
        sectors_read,
        time_reading_ms,
        writes_completed,
        writes_merged,
        sectors_written,
        time_writing_ms,
        ios_in_progress,
        time_io_ms,
        weighted_time_io_ms,
        discards,
        flushes,
    })
}


/// INTERNAL: Compute the statistics increments of one block device
fn disk_delta(previous: &DiskStats,
              current: &DiskStats) -> Result<DiskStats, CounterReset> {
    let name = |field: &str| format!("{}.{}", current.name, field);
    let counter = |field: &str, previous: u64, current: u64| {
        delta::counter(name(field), previous, current)
    };

    let discards = match (previous.discards, current.discards) {
        (Some(previous), Some(current)) => Some(Discards {
            completed: counter("discards.completed", previous.completed, current.completed)?,
            merged: counter("discards.merged", previous.merged, current.merged)?,
            sectors: counter("discards.sectors", previous.sectors, current.sectors)?,
            time_ms: counter("discards.time_ms", previous.time_ms, current.time_ms)?,
        }),
        _ => None,
    };
    let flushes = match (previous.flushes, current.flushes) {
        (Some(previous), Some(current)) => Some(Flushes {
            completed: counter("flushes.completed", previous.completed, current.completed)?,
            time_ms: counter("flushes.time_ms", previous.time_ms, current.time_ms)?,
        }),
        _ => None,
    };

    Ok(DiskStats {
        major: current.major,
        minor: current.minor,
        name: current.name.clone(),
        reads_completed: counter("reads_completed",
                                 previous.reads_completed,
                                 current.reads_completed)?,
        reads_merged: counter("reads_merged",
                              previous.reads_merged,
                              current.reads_merged)?,
        sectors_read: counter("sectors_read",
                              previous.sectors_read,
                              current.sectors_read)?,
        time_reading_ms: counter("time_reading_ms",
                                 previous.time_reading_ms,
                                 current.time_reading_ms)?,
        writes_completed: counter("writes_completed",
                                  previous.writes_completed,
                                  current.writes_completed)?,
        writes_merged: counter("writes_merged",
                               previous.writes_merged,
                               current.writes_merged)?,
        sectors_written: counter("sectors_written",
                                 previous.sectors_written,
                                 current.sectors_written)?,
        time_writing_ms: counter("time_writing_ms",
                                 previous.time_writing_ms,
                                 current.time_writing_ms)?,
        ios_in_progress: current.ios_in_progress,
        time_io_ms: counter("time_io_ms",
                            previous.time_io_ms,
                            current.time_io_ms)?,
        weighted_time_io_ms: counter("weighted_time_io_ms",
                                     previous.weighted_time_io_ms,
                                     current.weighted_time_io_ms)?,
        discards,
        flushes,
    })
}
