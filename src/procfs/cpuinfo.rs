//! This module contains a parser for /proc/cpuinfo
//!
//! The contents of this file are very architecture-dependent, and only change
//! on CPU hotplug or frequency scaling. It is thus meant to be read once,
//! when a tool needs to know about the host's processors.

use bytesize::ByteSize;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use tracing::trace;
use crate::error::ParseError;
use crate::parser::PseudoFileParser;
use crate::pseudo_file::SchemaId;
use crate::splitter::{Block, KeyValue, RepeatedBlocks};
use super::{parse_kib, parse_number};


/// Sampler for /proc/cpuinfo (one-shot by default)
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/cpuinfo
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::CpuInfo;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        let processors = RepeatedBlocks::new(file_contents, "processor")
                             .map(parse_processor)
                             .collect::<Result<Vec<_>, _>>()?;
        Ok(Record { processors })
    }
}


/// Contents of /proc/cpuinfo
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// Logical processors, in file order
    pub processors: Vec<Processor>,
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} processors", self.processors.len())?;
        let models = self.processors.iter()
                                    .filter_map(|cpu| cpu.model_name.as_deref())
                                    .unique()
                                    .join(", ");
        if !models.is_empty() {
            write!(f, " ({})", models)?;
        }
        Ok(())
    }
}


/// Description of one logical processor (hardware thread)
///
/// Only `processor` is present on every architecture. Everything else is
/// optional, and absent when the kernel does not report it.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Processor {
    /// Logical processor index
    pub processor: u32,

    /// CPU vendor identifier (e.g. "GenuineIntel")
    pub vendor_id: Option<String>,

    /// Human-readable model name
    pub model_name: Option<String>,

    /// Current clock frequency, in MHz
    pub cpu_mhz: Option<f64>,

    /// Size of the last level cache
    pub cache_size: Option<ByteSize>,

    /// Physical package (socket) identifier
    pub physical_id: Option<u32>,

    /// Core identifier within the package
    pub core_id: Option<u32>,

    /// Number of logical processors in the package
    pub siblings: Option<u32>,

    /// Number of cores in the package
    pub cpu_cores: Option<u32>,

    /// CPU feature flags ("flags" on x86, "Features" on arm64)
    pub flags: Vec<String>,

    /// Kernel's rough estimate of processor speed
    pub bogomips: Option<f64>,
}
//
impl Processor {
    /// Truth that the processor advertises a certain feature flag
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|candidate| candidate == flag)
    }
}


/// INTERNAL: Parse the block of lines describing a logical processor
fn parse_processor(block: Block) -> Result<Processor, ParseError> {
    let mut processor = None;
    let mut result = Processor::default();
    for key_value in block.key_values() {
        let (line, key, value) = match key_value {
            KeyValue::Pair { line, key, value } => (line, key, value),
            KeyValue::Blank { .. } => continue,
            KeyValue::Malformed { line, text } => {
                return Err(ParseError::MalformedLine(line, text.to_owned()));
            },
        };

        // The processor index is known at the start of each block, and used
        // to name the other fields in errors
        let name = || format!("cpu{}.{}", processor.unwrap_or(0), key);
        match key {
            "processor" => {
                processor = Some(parse_number::<u32>(key, value)?);
            },
            "vendor_id" => result.vendor_id = Some(value.to_owned()),
            "model name" => result.model_name = Some(value.to_owned()),
            "cpu MHz" => result.cpu_mhz = Some(parse_number(&name(), value)?),
            "cache size" => {
                let kib = value.strip_suffix("KB")
                               .map(str::trim_end)
                               .ok_or_else(|| ParseError::invalid(name(), value))?;
                result.cache_size = Some(parse_kib(&name(), kib)?);
            },
            "physical id" => result.physical_id = Some(parse_number(&name(), value)?),
            "core id" => result.core_id = Some(parse_number(&name(), value)?),
            "siblings" => result.siblings = Some(parse_number(&name(), value)?),
            "cpu cores" => result.cpu_cores = Some(parse_number(&name(), value)?),
            "flags" | "Features" => {
                result.flags = value.split_ascii_whitespace()
                                    .map(str::to_owned)
                                    .collect();
            },
            "bogomips" | "BogoMIPS" => {
                result.bogomips = Some(parse_number(&name(), value)?);
            },
            _ => trace!(line, key, "Skipping unsupported /proc/cpuinfo field"),
        }
    }

    // Blocks always start with the processor index, so this cannot fail
    // unless the splitter is broken
    result.processor = processor.ok_or_else(|| ParseError::missing("processor"))?;
    Ok(result)
}




/// Performance benchmarks
///
/// Run them with `cargo test --release -- --ignored --nocapture`.
///
#[cfg(test)]
mod benchmarks {
    define_sampler_benchs!{ super::Parser, 50_000 }
}
