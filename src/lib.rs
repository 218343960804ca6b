//! Low-overhead sampling of Linux procfs pseudo-files into typed records
//!
//! The pseudo-files of /proc are the primary source of system performance
//! data on Linux. They are generated by the kernel on every read, in a
//! semi-structured text format which evolves, in a backwards-compatible way,
//! across kernel versions. This crate reads them, turns their contents into
//! typed records, and for files with counters, tells how these counters
//! evolved between two samples.
//!
//! The processing pipeline for one sample is:
//!
//! - The `reader` fetches the raw file contents into a reusable buffer
//! - The `splitter` breaks these contents into lines, columns and key-value
//!   pairs without copying them
//! - A schema-specific parser from `procfs` turns these tokens into a record
//! - The `sampler` orchestrates all of this and remembers the previous record
//!   for delta computations
//!
//! For example, here is how one would monitor CPU activity:
//!
//! ```no_run
//! use procsampler::procfs::stat;
//!
//! let mut sampler = stat::Sampler::system();
//! loop {
//!     let (record, delta) = sampler.sample_with_delta()?;
//!     if let Some(Ok(delta)) = delta {
//!         for (cpu, times) in record.per_cpu.iter().zip(&delta.changes.per_cpu) {
//!             println!("{}: {} jiffies of user time", cpu.id, times.user);
//!         }
//!     }
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! # Ok::<(), procsampler::Error>(())
//! ```

#[macro_use]
pub mod sampler;

pub mod config;
pub mod delta;
pub mod error;
pub mod parser;
pub mod procfs;
pub mod pseudo_file;
pub mod reader;
pub mod splitter;

pub use crate::config::SamplerConfig;
pub use crate::delta::{CounterReset, DeltaSlot, SampleDelta};
pub use crate::error::{Error, ParseError, ReadError};
pub use crate::parser::{DeltaParser, PseudoFileParser};
pub use crate::pseudo_file::{AccessMode, PseudoFile, SchemaId};
pub use crate::sampler::Sampler;
