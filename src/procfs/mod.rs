//! This module contains parsers for the contents of procfs.
//!
//! Most parsers are designed to allow sampling the contents of /proc files at
//! a rapid rate, for the purpose of acquiring, analyzing and displaying useful
//! statistics on the time evolution of system performance.
//!
//! Each submodule corresponds to one file in /proc, and is named as close to
//! that file as allowed by the Rust module system. Every submodule provides a
//! `Parser` implementing `PseudoFileParser`, the associated `Record` type and
//! a `Sampler` alias. Files with counters also provide a `Delta` type.
//!
//! The top-level module contains utilities which are used by multiple modules.

pub mod cpuinfo;
pub mod diskstats;
pub mod loadavg;
pub mod meminfo;
pub mod pid_status;
pub mod stat;
pub mod uptime;
pub mod version;
pub mod vmstat;

use bytesize::ByteSize;
use std::str::FromStr;
use std::time::Duration;
use crate::error::ParseError;


/// Specialized parser for Durations expressed in fractional seconds, using the
/// usual text format XXXX[.[YY]]. Sub-nanosecond decimals are truncated.
fn parse_duration_secs(field: &str, input: &str) -> Result<Duration, ParseError> {
    let invalid = || ParseError::invalid(field, input);

    // Separate the integral part from the fractional part (if any)
    let (integer, decimals) = match input.split_once('.') {
        Some((integer, decimals)) => (integer, decimals),
        None => (input, ""),
    };
    if integer.is_empty() || !all_digits(integer) || !all_digits(decimals) {
        return Err(invalid());
    }

    // Parse the number of full seconds
    let seconds = integer.parse::<u64>().map_err(|_| invalid())?;

    // Parse the number of extra nanoseconds, if any. The "XXXX." syntax used
    // by some text printers has no decimals and thus no nanoseconds.
    let decimals = &decimals[..decimals.len().min(9)];
    let nanoseconds = if decimals.is_empty() {
        0
    } else {
        // At most 9 decimals, so both of these fit in a u32
        let nanosecs_multiplier = 10u32.pow(9 - decimals.len() as u32);
        decimals.parse::<u32>().map_err(|_| invalid())? * nanosecs_multiplier
    };

    // Return the Duration that we just parsed
    Ok(Duration::new(seconds, nanoseconds))
}

/// Parse a decimal number, naming the field on failure
fn parse_number<T: FromStr>(field: &str, input: &str) -> Result<T, ParseError> {
    input.parse::<T>().map_err(|_| ParseError::invalid(field, input))
}

/// Parse a hexadecimal number, as found in the masks of /proc/<pid>/status
fn parse_hex_u64(field: &str, input: &str) -> Result<u64, ParseError> {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::invalid(field, input));
    }
    u64::from_str_radix(input, 16).map_err(|_| ParseError::invalid(field, input))
}

/// Parse a data volume expressed in kB (which, in procfs, means KiB)
fn parse_kib(field: &str, input: &str) -> Result<ByteSize, ParseError> {
    let kib = parse_number::<u64>(field, input)?;
    kib.checked_mul(1024)
       .map(ByteSize::b)
       .ok_or_else(|| ParseError::invalid(field, input))
}

/// Fetch the next mandatory column of a line
fn next_column<'a, I>(columns: &mut I, field: &str) -> Result<&'a str, ParseError>
    where I: Iterator<Item = &'a str>
{
    columns.next().ok_or_else(|| ParseError::missing(field))
}

/// INTERNAL: Truth that a string only contains decimal digits
fn all_digits(input: &str) -> bool {
    input.bytes().all(|b| b.is_ascii_digit())
}


/// These are the unit tests for this module
#[cfg(test)]
mod tests {
    use bytesize::ByteSize;
    use std::time::Duration;
    use crate::error::ParseError;

    /// Check that our Duration parser works as expected
    #[test]
    fn parse_duration() {
        let parse = |input| super::parse_duration_secs("uptime", input);

        // Plain seconds
        assert_eq!(parse("42"), Ok(Duration::new(42, 0)));

        // Trailing decimal point
        assert_eq!(parse("3."), Ok(Duration::new(3, 0)));

        // Some amounts of fractional seconds, down to nanosecond precision
        assert_eq!(parse("4.2"), Ok(Duration::new(4, 200_000_000)));
        assert_eq!(parse("5.34"), Ok(Duration::new(5, 340_000_000)));
        assert_eq!(parse("6.567891234"), Ok(Duration::new(6, 567_891_234)));

        // Sub-nanosecond precision is truncated
        assert_eq!(parse("7.8901234567"), Ok(Duration::new(7, 890_123_456)));

        // Garbage is reported, naming the field
        for garbage in ["", ".5", "1.2.3", "-1", "1e3", "12a", "1.+5"] {
            assert_eq!(parse(garbage),
                       Err(ParseError::invalid("uptime", garbage)));
        }
    }

    /// Check the other number parsers
    #[test]
    fn parse_numbers() {
        assert_eq!(super::parse_number::<u64>("ctxt", "123"), Ok(123));
        assert_eq!(super::parse_number::<u64>("ctxt", "12a"),
                   Err(ParseError::invalid("ctxt", "12a")));
        assert_eq!(super::parse_hex_u64("SigCgt", "0000000000014002"),
                   Ok(0x14002));
        assert_eq!(super::parse_hex_u64("SigCgt", "0x10"),
                   Err(ParseError::invalid("SigCgt", "0x10")));
        assert_eq!(super::parse_kib("MemTotal", "16"), Ok(ByteSize::kib(16)));
        assert_eq!(super::parse_kib("MemTotal", "18446744073709551615"),
                   Err(ParseError::invalid("MemTotal",
                                           "18446744073709551615")));
    }

    /// Check that mandatory columns are reported when missing
    #[test]
    fn mandatory_columns() {
        let mut columns = "a".split(' ');
        assert_eq!(super::next_column(&mut columns, "first"), Ok("a"));
        assert_eq!(super::next_column(&mut columns, "second"),
                   Err(ParseError::missing("second")));
    }
}
