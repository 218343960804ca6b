//! This module contains a sampling parser for /proc/vmstat

use serde::Serialize;
use std::fmt;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;
use crate::parser::{DeltaParser, PseudoFileParser};
use crate::pseudo_file::SchemaId;
use crate::splitter::SplitLinesBySpace;
use super::{next_column, parse_number};


/// Sampler for /proc/vmstat
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/vmstat
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::VmStat;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        let mut entries = Vec::new();
        let mut lines = SplitLinesBySpace::new(file_contents);
        while let Some(mut columns) = lines.next() {
            let key = match columns.next() {
                Some(key) => key,
                None => continue,
            };
            let raw_value = next_column(&mut columns, key)?;
            entries.push((key.to_owned(), parse_number(key, raw_value)?));
        }
        Ok(Record { entries })
    }
}
//
impl DeltaParser for Parser {
    type Delta = Delta;

    fn delta(previous: &Record, current: &Record) -> Result<Delta, CounterReset> {
        let mut events = Vec::new();
        for (index, (key, current_value)) in current.entries.iter().enumerate() {
            if !is_event_counter(key) {
                continue;
            }

            // Entries almost always come in the same order, so try the same
            // position in the previous record before searching it
            let previous_value = match previous.entries.get(index) {
                Some((previous_key, value)) if previous_key == key => Some(*value),
                _ => previous.get(key),
            };
            if let Some(previous_value) = previous_value {
                let increment = delta::counter(key.as_str(),
                                               previous_value,
                                               *current_value)?;
                events.push((key.clone(), increment));
            }
        }
        Ok(Delta { events })
    }
}


/// Entries of /proc/vmstat which count events since boot. Everything else is
/// a gauge (e.g. nr_free_pages) and has no meaningful increment.
const EVENT_COUNTERS: &[&str] = &[
    "pgpgin",
    "pgpgout",
    "pswpin",
    "pswpout",
    "pgfault",
    "pgmajfault",
    "pgfree",
    "pgactivate",
    "pgdeactivate",
    "pgrefill",
    "oom_kill",
    "nr_dirtied",
    "nr_written",
    "compact_stall",
    "thp_fault_alloc",
];

/// Families of event counters which are broken down by zone or reclaim path
const EVENT_PREFIXES: &[&str] = &["pgalloc_", "pgsteal_", "pgscan_"];

/// Truth that an entry of /proc/vmstat is an event counter
pub fn is_event_counter(key: &str) -> bool {
    EVENT_COUNTERS.contains(&key)
        || EVENT_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}


/// Contents of /proc/vmstat, as key/value pairs in file order
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// Entries, in the order in which they appear in the file
    pub entries: Vec<(String, u64)>,
}
//
impl Record {
    /// Look up an entry by key
    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.iter()
                    .find(|(entry_key, _)| entry_key == key)
                    .map(|&(_, value)| value)
    }
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} vmstat entries", self.entries.len())?;
        if let (Some(pgfault), Some(pgmajfault)) = (self.get("pgfault"),
                                                     self.get("pgmajfault")) {
            write!(f, ", {} page faults ({} major)", pgfault, pgmajfault)?;
        }
        Ok(())
    }
}


/// Increments of the event counters present in two samples of /proc/vmstat
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Delta {
    /// Event counter increments, in the order of the current record
    pub events: Vec<(String, u64)>,
}
//
impl Delta {
    /// Look up the increment of an event counter
    pub fn get(&self, key: &str) -> Option<u64> {
        self.events.iter()
                   .find(|(event_key, _)| event_key == key)
                   .map(|&(_, increment)| increment)
    }
}




/// Performance benchmarks
///
/// Run them with `cargo test --release -- --ignored --nocapture`.
///
#[cfg(test)]
mod benchmarks {
    define_sampler_benchs!{ super::Parser, 200_000 }
}
