//! This module contains a sampling parser for /proc/loadavg

use serde::Serialize;
use std::fmt;
use crate::error::ParseError;
use crate::parser::PseudoFileParser;
use crate::pseudo_file::SchemaId;
use super::{next_column, parse_number};


/// Sampler for /proc/loadavg
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/loadavg
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::LoadAvg;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        // The file is a single line of space-separated columns
        let mut columns = file_contents.split_ascii_whitespace();

        // Load averages are fixed-point numbers printed with two decimals
        let mut load = |field: &str| -> Result<f64, ParseError> {
            let raw = next_column(&mut columns, field)?;
            let value = parse_number::<f64>(field, raw)?;
            if value.is_finite() && value >= 0.0 {
                Ok(value)
            } else {
                Err(ParseError::invalid(field, raw))
            }
        };
        let load_1 = load("load_1")?;
        let load_5 = load("load_5")?;
        let load_15 = load("load_15")?;

        // Then comes the "runnable/total" scheduling entity count
        let raw_entities = next_column(&mut columns, "runnable")?;
        let (raw_runnable, raw_total) =
            raw_entities.split_once('/')
                        .ok_or_else(|| ParseError::invalid("runnable", raw_entities))?;
        let runnable = parse_number("runnable", raw_runnable)?;
        let total = parse_number("total", raw_total)?;

        // And finally, the most recently allocated pid
        let last_pid = parse_number("last_pid", next_column(&mut columns, "last_pid")?)?;

        Ok(Record { load_1, load_5, load_15, runnable, total, last_pid })
    }
}


/// Contents of /proc/loadavg
///
/// The load averages are exponentially decaying averages of the number of
/// runnable and uninterruptible tasks, over the last 1, 5 and 15 minutes.
/// Everything in this file is a gauge, so there is no delta.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Record {
    /// Load average over the last minute
    pub load_1: f64,

    /// Load average over the last 5 minutes
    pub load_5: f64,

    /// Load average over the last 15 minutes
    pub load_15: f64,

    /// Number of currently runnable kernel scheduling entities
    pub runnable: u32,

    /// Number of kernel scheduling entities that currently exist
    pub total: u32,

    /// Pid of the most recently created process
    pub last_pid: u32,
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "load average: {:.2}, {:.2}, {:.2} ({}/{} runnable)",
               self.load_1, self.load_5, self.load_15, self.runnable, self.total)
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::ParseError;
    use crate::parser::PseudoFileParser;
    use super::{Parser, Record};

    /// Check that loadavg parsing works well
    #[test]
    fn parse_loadavg() {
        let record = Parser::parse("0.52 0.58 0.59 1/467 12345\n")
                            .expect("Should parse");
        assert_eq!(record, Record {
            load_1: 0.52,
            load_5: 0.58,
            load_15: 0.59,
            runnable: 1,
            total: 467,
            last_pid: 12345,
        });
        assert_eq!(record.to_string(),
                   "load average: 0.52, 0.58, 0.59 (1/467 runnable)");
    }

    /// Check that columns from newer kernels do not affect the record
    #[test]
    fn extra_loadavg_columns() {
        let base = "0.52 0.58 0.59 1/467 12345\n";
        let with_extra = "0.52 0.58 0.59 1/467 12345 0.61 42/7\n";
        assert!(Parser::parse(base).is_ok());
        assert_eq!(Parser::parse(with_extra), Parser::parse(base));
    }

    /// Check that broken loadavg contents are reported
    #[test]
    fn broken_loadavg() {
        assert_eq!(Parser::parse(""), Err(ParseError::missing("load_1")));
        assert_eq!(Parser::parse("0.52 0.58 0.59 1/467\n"),
                   Err(ParseError::missing("last_pid")));
        assert_eq!(Parser::parse("0.52 -0.58 0.59 1/467 1\n"),
                   Err(ParseError::invalid("load_5", "-0.58")));
        assert_eq!(Parser::parse("0.52 0.58 NaN 1/467 1\n"),
                   Err(ParseError::invalid("load_15", "NaN")));
        assert_eq!(Parser::parse("0.52 0.58 0.59 1467 1\n"),
                   Err(ParseError::invalid("runnable", "1467")));
        assert_eq!(Parser::parse("0.52 0.58 0.59 1/x 1\n"),
                   Err(ParseError::invalid("total", "x")));
    }

    define_sampler_tests!{ super::Parser }
}
