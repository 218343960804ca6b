//! This module contains facilities for parsing the data contained in the IRQ
//! statistics of /proc/stat (intr and softirq).

use serde::Serialize;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;


/// Interrupt statistics from /proc/stat
///
/// The same type is used for increments between two samples.
///
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Interrupts {
    /// Total number of interrupts that were serviced. May be higher than the
    /// sum of the breakdown below if there are unnumbered interrupt sources.
    pub total: u64,

    /// Number of serviced interrupts for each numbered source, in file order.
    /// Beware that not all interrupt sources are numbered by the Linux kernel.
    pub details: Vec<u64>,
}


/// Parse the columns of an interrupt line, after the header
pub(super) fn parse<'a, I>(header: &str, mut columns: I) -> Result<Interrupts, ParseError>
    where I: Iterator<Item = &'a str>
{
    // Load the total interrupt count
    let raw_total = columns.next().ok_or_else(|| ParseError::missing(header))?;
    let total = raw_total.parse::<u64>()
                         .map_err(|_| ParseError::invalid(header, raw_total))?;

    // Load the detailed interrupt counts from each source
    let details = columns.enumerate()
                         .map(|(index, raw_count)| {
                             parse_count(raw_count).ok_or_else(|| {
                                 ParseError::invalid(format!("{}[{}]", header, index),
                                                     raw_count)
                             })
                         })
                         .collect::<Result<Vec<u64>, ParseError>>()?;

    Ok(Interrupts { total, details })
}

/// INTERNAL: Parse one interrupt counter
///
/// On some architectures such as x86_64, there are many possible interrupt
/// sources and most of them will never fire. Special-casing zero interrupt
/// counts thus speeds up parsing.
///
#[inline]
fn parse_count(raw_count: &str) -> Option<u64> {
    if raw_count == "0" {
        Some(0)
    } else {
        raw_count.parse().ok()
    }
}


/// Truth that two interrupt records list the same interrupt sources
pub(super) fn compatible(previous: &Interrupts, current: &Interrupts) -> bool {
    previous.details.len() == current.details.len()
}


/// Compute the interrupt count increments of compatible records
pub(super) fn delta(header: &str,
                    previous: &Interrupts,
                    current: &Interrupts) -> Result<Interrupts, CounterReset> {
    let total = delta::counter(header, previous.total, current.total)?;
    let details = previous.details.iter()
                          .zip(&current.details)
                          .enumerate()
                          .map(|(index, (&previous, &current))| {
                              delta::counter(format!("{}[{}]", header, index),
                                             previous,
                                             current)
                          })
                          .collect::<Result<Vec<u64>, CounterReset>>()?;
    Ok(Interrupts { total, details })
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::ParseError;
    use crate::splitter::split_line_and_run;
    use super::Interrupts;

    /// Check that interrupt statistics are parsed correctly
    #[test]
    fn parse_interrupts() {
        let parsed = split_line_and_run("12345 0 27 0 0 1024", |columns| {
            super::parse("intr", columns)
        });
        assert_eq!(parsed, Ok(Interrupts {
            total: 12345,
            details: vec![0, 27, 0, 0, 1024],
        }));

        // A total without a breakdown is fine
        let total_only = split_line_and_run("42", |columns| {
            super::parse("softirq", columns)
        });
        assert_eq!(total_only, Ok(Interrupts { total: 42, details: vec![] }));
    }

    /// Check that broken interrupt statistics are reported
    #[test]
    fn broken_interrupts() {
        assert_eq!(split_line_and_run(" ", |columns| super::parse("intr", columns)),
                   Err(ParseError::missing("intr")));
        assert_eq!(split_line_and_run("10 0 -1", |columns| {
                       super::parse("intr", columns)
                   }),
                   Err(ParseError::invalid("intr[1]", "-1")));
    }

    /// Check interrupt count increments
    #[test]
    fn interrupt_delta() {
        let before = Interrupts { total: 100, details: vec![0, 50] };
        let after = Interrupts { total: 130, details: vec![5, 60] };
        assert!(super::compatible(&before, &after));
        assert_eq!(super::delta("intr", &before, &after),
                   Ok(Interrupts { total: 30, details: vec![5, 10] }));

        let reset = super::delta("intr", &after, &before)
                           .expect_err("Interrupt counts went backwards");
        assert_eq!(reset.counter, "intr");

        let shorter = Interrupts { total: 130, details: vec![5] };
        assert!(!super::compatible(&before, &shorter));
    }
}
