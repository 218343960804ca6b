//! This module contains a sampling parser for /proc/meminfo

use bytesize::ByteSize;
use serde::Serialize;
use std::fmt;
use tracing::trace;
use crate::error::ParseError;
use crate::parser::PseudoFileParser;
use crate::pseudo_file::SchemaId;
use crate::splitter::{KeyValue, SplitKeyValue};
use super::{parse_kib, parse_number};


/// Sampler for /proc/meminfo
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/meminfo
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::MemInfo;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        let mut entries = Vec::new();
        for key_value in SplitKeyValue::new(file_contents) {
            let (line, key, value) = match key_value {
                KeyValue::Pair { line, key, value } => (line, key, value),
                KeyValue::Blank { .. } => continue,
                KeyValue::Malformed { line, text } => {
                    return Err(ParseError::MalformedLine(line, text.to_owned()));
                },
            };

            // The value should start with a number, which may or may not come
            // with a suffix which clarifies its semantics
            let mut columns = value.split_whitespace();
            let raw_number = columns.next()
                                    .ok_or_else(|| ParseError::missing(key))?;
            let value = match columns.next() {
                // A volume of data (in KiB, don't trust the kernel's units...)
                Some("kB") => Value::Volume(parse_kib(key, raw_number)?),

                // A raw counter without any special semantics attached to it
                None => Value::Count(parse_number(key, raw_number)?),

                // Something we don't know how to interpret
                Some(unit) => {
                    trace!(line, key, unit, "Skipping meminfo entry with unknown unit");
                    continue;
                },
            };
            entries.push(Entry { key: key.to_owned(), value });
        }
        Ok(Record { entries })
    }
}


/// Contents of /proc/meminfo
///
/// As /proc/meminfo is just a (large) set of named data volumes with a few
/// counters sprinkled in the middle, it maps very well to a vector of enums.
///
/// The layout is optimized for fast parsing rather than fast lookup of a
/// specific key. Clients which frequently need to look up keys are
/// encouraged to build a HashMap for this purpose.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// Entries, in the order in which they appear in the file
    pub entries: Vec<Entry>,
}
//
impl Record {
    /// Look up an entry by key (case-sensitive, e.g. "Active(anon)")
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.iter()
                    .find(|entry| entry.key == key)
                    .map(|entry| entry.value)
    }

    /// Look up a data volume by key
    pub fn volume(&self, key: &str) -> Option<ByteSize> {
        match self.get(key)? {
            Value::Volume(volume) => Some(volume),
            Value::Count(_) => None,
        }
    }

    /// Total usable RAM
    pub fn mem_total(&self) -> Option<ByteSize> {
        self.volume("MemTotal")
    }

    /// RAM which is left completely unused
    pub fn mem_free(&self) -> Option<ByteSize> {
        self.volume("MemFree")
    }

    /// Estimate of the RAM available for new applications without swapping
    /// (since Linux 3.14)
    pub fn mem_available(&self) -> Option<ByteSize> {
        self.volume("MemAvailable")
    }

    /// Total amount of swap space
    pub fn swap_total(&self) -> Option<ByteSize> {
        self.volume("SwapTotal")
    }

    /// Unused swap space
    pub fn swap_free(&self) -> Option<ByteSize> {
        self.volume("SwapFree")
    }
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.mem_total(), self.mem_available().or_else(|| self.mem_free())) {
            (Some(total), Some(available)) => {
                write!(f, "{} available out of {}", available, total)
            },
            _ => write!(f, "{} memory entries", self.entries.len()),
        }
    }
}


/// One line of /proc/meminfo
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Entry {
    /// Name of the entry, without the colon
    pub key: String,

    /// Value of the entry
    pub value: Value,
}


/// Values from /proc/meminfo, which can measure different things
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Value {
    /// A volume of data
    Volume(ByteSize),

    /// A raw counter of something (e.g. free huge pages)
    Count(u64),
}
//
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Volume(volume) => write!(f, "{}", volume),
            Value::Count(count) => write!(f, "{}", count),
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use bytesize::ByteSize;
    use crate::error::ParseError;
    use crate::parser::PseudoFileParser;
    use super::{Entry, Parser, Record, Value};

    /// Check that meminfo parsing works well
    #[test]
    fn parse_meminfo() {
        // Starting with an empty file (should never happen, but good base case)
        assert_eq!(Parser::parse(""), Ok(Record::default()));

        // A data volume and a counter
        let record = Parser::parse("MyDataVolume:   1234 kB\n\
                                    MyCounter:   42\n")
                            .expect("Should parse");
        assert_eq!(record.entries, vec![
            Entry {
                key: "MyDataVolume".to_owned(),
                value: Value::Volume(ByteSize::kib(1234)),
            },
            Entry {
                key: "MyCounter".to_owned(),
                value: Value::Count(42),
            },
        ]);
        assert_eq!(record.get("MyCounter"), Some(Value::Count(42)));
        assert_eq!(record.volume("MyCounter"), None);
        assert_eq!(record.get("mycounter"), None);
    }

    /// Check that unknown units are skipped, but not the rest of the file
    #[test]
    fn unknown_units() {
        let record = Parser::parse("Weird:   57 TiB\nNormal:   1 kB\n")
                            .expect("Should parse");
        assert_eq!(record.get("Weird"), None);
        assert_eq!(record.volume("Normal"), Some(ByteSize::kib(1)));
    }

    /// Check that a kernel without MemAvailable is handled
    #[test]
    fn missing_mem_available() {
        let record = Parser::parse("MemTotal:        6158152 kB\n\
                                    MemFree:         5357388 kB\n\
                                    Buffers:           52436 kB\n")
                            .expect("Should parse");
        assert_eq!(record.mem_total(), Some(ByteSize::kib(6158152)));
        assert_eq!(record.mem_available(), None);
        assert_eq!(record.swap_total(), None);
        assert_eq!(record.to_string(),
                   format!("{} available out of {}",
                           ByteSize::kib(5357388), ByteSize::kib(6158152)));
    }

    /// Check that broken contents are reported
    #[test]
    fn broken_meminfo() {
        assert_eq!(Parser::parse("MemTotal: 12a kB\n"),
                   Err(ParseError::invalid("MemTotal", "12a")));
        assert_eq!(Parser::parse("MemTotal: 1 kB\nnonsense\n"),
                   Err(ParseError::MalformedLine(2, "nonsense".to_owned())));
        assert_eq!(Parser::parse("MemTotal:\n"),
                   Err(ParseError::missing("MemTotal")));
    }

    define_sampler_tests!{ super::Parser }
}
