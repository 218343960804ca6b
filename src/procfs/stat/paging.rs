//! This module contains facilities for parsing the data contained in the
//! paging statistics of /proc/stat (page and swap).
//!
//! These lines were moved to /proc/vmstat in Linux 2.6, so they are only
//! found on very old kernels.

use serde::Serialize;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;


/// Storage paging activity statistics, in pages
///
/// The same type is used for increments between two samples.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Paging {
    /// Number of memory pages that were brought in from disk
    pub incoming: u64,

    /// Number of memory pages that were sent out to disk
    pub outgoing: u64,
}


/// Decode the paging data of a "page" or "swap" line, after the header
pub(super) fn parse<'a, I>(header: &str, mut columns: I) -> Result<Paging, ParseError>
    where I: Iterator<Item = &'a str>
{
    // This is how we decode one field from the input
    let mut parse_counter = |field: &str| -> Result<u64, ParseError> {
        let name = || format!("{}.{}", header, field);
        let raw = columns.next().ok_or_else(|| ParseError::missing(name()))?;
        raw.parse().map_err(|_| ParseError::invalid(name(), raw))
    };

    // Parse the counters of incoming and outgoing pages
    Ok(Paging {
        incoming: parse_counter("incoming")?,
        outgoing: parse_counter("outgoing")?,
    })
}


/// Compute the paging counter increments
pub(super) fn delta(header: &str,
                    previous: &Paging,
                    current: &Paging) -> Result<Paging, CounterReset> {
    Ok(Paging {
        incoming: delta::counter(format!("{}.incoming", header),
                                 previous.incoming,
                                 current.incoming)?,
        outgoing: delta::counter(format!("{}.outgoing", header),
                                 previous.outgoing,
                                 current.outgoing)?,
    })
}
