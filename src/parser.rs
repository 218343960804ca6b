//! This module defines what a pseudo-file parser is
//!
//! The textual data from a pseudo-file is not exploitable right after it has
//! been fetched from the kernel. It must be parsed back into usable numbers
//! first. And this is what a parser does: it takes the text of a pseudo-file
//! as input, and provides a typed record as output. By nature, this operation
//! is very specific to a given pseudo-file format, aside from some basic text
//! processing building blocks, so each file gets its own parser.
//!
//! Parsers are stateless and pure: the same input always produces the same
//! record, or the same error. This makes them trivially testable on captured
//! file contents, without access to a live procfs. Anything which needs to
//! remember past samples, such as the computation of counter increments, is
//! the job of the sampler.
//!
//! All parsers follow the same forward compatibility rules: lines and columns
//! which they do not know about are skipped, fields which only exist on some
//! kernel versions are optional, and only the absence of a field which a
//! record cannot do without is reported as an error.

use crate::delta::CounterReset;
use crate::error::ParseError;
use crate::pseudo_file::SchemaId;
use std::fmt::Debug;


/// Interface contract which must be met by all pseudo-file parsers
pub trait PseudoFileParser {
    /// Typed contents of the pseudo-file
    type Record: Clone + Debug + PartialEq;

    /// Kind of pseudo-file that this parser understands
    const SCHEMA: SchemaId;

    /// Parse the full contents of the pseudo-file into a record
    fn parse(file_contents: &str) -> Result<Self::Record, ParseError>;
}


/// Parsers of pseudo-files which contain monotonic counters can additionally
/// tell how these counters evolved between two records.
pub trait DeltaParser: PseudoFileParser {
    /// Counter increments (and gauge values) between two records
    type Delta: Clone + Debug + PartialEq;

    /// Truth that two records describe the same set of entities, and can
    /// thus be compared. This is not the case, for example, when a CPU was
    /// hotplugged or a disk was removed between the two samples.
    fn compatible(_previous: &Self::Record, _current: &Self::Record) -> bool {
        true
    }

    /// Compute the increments between two compatible records. A counter which
    /// went backwards (due to a wraparound or a device reset) is reported
    /// as an error instead of being turned into a garbage increment.
    fn delta(previous: &Self::Record,
             current: &Self::Record) -> Result<Self::Delta, CounterReset>;
}
