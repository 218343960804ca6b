//! This module contains a sampling parser for /proc/uptime

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;
use crate::parser::{DeltaParser, PseudoFileParser};
use crate::pseudo_file::SchemaId;
use crate::splitter::SplitLinesBySpace;
use super::{next_column, parse_duration_secs};


/// Sampler for /proc/uptime
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/uptime
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::Uptime;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        // The file is a single line of two numbers
        let mut lines = SplitLinesBySpace::new(file_contents);
        let mut columns = lines.next()
                               .ok_or_else(|| ParseError::missing("uptime"))?;

        // Load machine uptime and idle time
        let uptime = parse_duration_secs(
            "uptime",
            next_column(&mut columns, "uptime")?
        )?;
        let idle = parse_duration_secs(
            "idle",
            next_column(&mut columns, "idle")?
        )?;

        // Extra columns from future kernels are ignored
        Ok(Record { uptime, idle })
    }
}
//
impl DeltaParser for Parser {
    type Delta = Record;

    fn delta(previous: &Record, current: &Record) -> Result<Record, CounterReset> {
        Ok(Record {
            uptime: delta::duration("uptime", previous.uptime, current.uptime)?,
            idle: delta::duration("idle", previous.idle, current.idle)?,
        })
    }
}


/// Contents of /proc/uptime
///
/// The same type is used for increments between two samples.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Record {
    /// Elapsed wall clock time since the system was started
    pub uptime: Duration,

    /// Cumulative amount of time spent by all CPUs in the idle state. This can
    /// be larger than the uptime on multi-core systems.
    pub idle: Duration,
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "up {:.2}s, idle {:.2}s",
               self.uptime.as_secs_f64(),
               self.idle.as_secs_f64())
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use std::time::Duration;
    use crate::error::ParseError;
    use crate::parser::{DeltaParser, PseudoFileParser};
    use super::{Parser, Record};

    /// Check that parsing uptime data works
    #[test]
    fn parse_uptime() {
        assert_eq!(Parser::parse("12345.67 10000.00\n"), Ok(Record {
            uptime: Duration::new(12345, 670_000_000),
            idle: Duration::new(10000, 0),
        }));
        assert_eq!(Parser::parse("13.52 50.34"), Ok(Record {
            uptime: Duration::new(13, 520_000_000),
            idle: Duration::new(50, 340_000_000),
        }));

        // Unknown extra columns are ignored
        assert!(Parser::parse("1.00 2.00 3.00\n").is_ok());
    }

    /// Check that broken uptime data is reported
    #[test]
    fn broken_uptime() {
        assert_eq!(Parser::parse(""), Err(ParseError::missing("uptime")));
        assert_eq!(Parser::parse("\n"), Err(ParseError::missing("uptime")));
        assert_eq!(Parser::parse("1.00\n"), Err(ParseError::missing("idle")));
        assert_eq!(Parser::parse("1.00 abc\n"),
                   Err(ParseError::invalid("idle", "abc")));
    }

    /// Check uptime increments
    #[test]
    fn uptime_delta() {
        let before = Parser::parse("10.00 30.00").expect("Valid uptime");
        let after = Parser::parse("11.50 33.00").expect("Valid uptime");
        assert_eq!(Parser::delta(&before, &after), Ok(Record {
            uptime: Duration::new(1, 500_000_000),
            idle: Duration::new(3, 0),
        }));
        assert!(Parser::delta(&after, &before).is_err());
    }

    /// Check the human-readable summary
    #[test]
    fn display() {
        let record = Parser::parse("12345.67 10000.00\n").expect("Valid uptime");
        assert_eq!(record.to_string(), "up 12345.67s, idle 10000.00s");
    }

    define_sampler_tests!{ super::Parser, delta }
}
