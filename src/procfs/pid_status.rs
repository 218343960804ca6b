//! This module contains a sampling parser for /proc/<pid>/status
//!
//! Use `PseudoFile::process()` or `PseudoFile::thread()` to select which
//! process is sampled. By default, samplers watch the calling process
//! through /proc/self/status.

use bytesize::ByteSize;
use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use tracing::trace;
use crate::delta::{self, CounterReset};
use crate::error::ParseError;
use crate::parser::{DeltaParser, PseudoFileParser};
use crate::pseudo_file::SchemaId;
use crate::splitter::{KeyValue, SplitKeyValue};
use super::{all_digits, parse_hex_u64, parse_kib, parse_number};


/// Sampler for /proc/<pid>/status
pub type Sampler = crate::sampler::Sampler<Parser>;


/// Parser for /proc/<pid>/status
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = Record;
    const SCHEMA: SchemaId = SchemaId::PidStatus;

    fn parse(file_contents: &str) -> Result<Record, ParseError> {
        let mut name = None;
        let mut pid = None;
        let mut record = Record::default();
        for key_value in SplitKeyValue::new(file_contents) {
            let (line, key, value) = match key_value {
                KeyValue::Pair { line, key, value } => (line, key, value),
                KeyValue::Blank { .. } => continue,
                KeyValue::Malformed { line, text } => {
                    return Err(ParseError::MalformedLine(line, text.to_owned()));
                },
            };
            match key {
                "Name" => name = Some(value.to_owned()),
                "State" => {
                    let state = value.chars()
                                     .next()
                                     .ok_or_else(|| ParseError::invalid(key, value))?;
                    record.state = Some(state);
                },
                "Tgid" => record.tgid = Some(parse_number(key, value)?),
                "Pid" => pid = Some(parse_number(key, value)?),
                "PPid" => record.ppid = Some(parse_number(key, value)?),
                "TracerPid" => record.tracer_pid = Some(parse_number(key, value)?),
                "Threads" => record.threads = Some(parse_number(key, value)?),
                "Uid" => record.uid = Some(parse_ids(key, value)?),
                "Gid" => record.gid = Some(parse_ids(key, value)?),
                "VmPeak" => record.vm_peak = Some(parse_volume(key, value)?),
                "VmSize" => record.vm_size = Some(parse_volume(key, value)?),
                "VmHWM" => record.vm_hwm = Some(parse_volume(key, value)?),
                "VmRSS" => record.vm_rss = Some(parse_volume(key, value)?),
                "VmSwap" => record.vm_swap = Some(parse_volume(key, value)?),
                "SigBlk" => record.sig_blk = Some(parse_hex_u64(key, value)?),
                "SigIgn" => record.sig_ign = Some(parse_hex_u64(key, value)?),
                "SigCgt" => record.sig_cgt = Some(parse_hex_u64(key, value)?),
                "Cpus_allowed" => {
                    record.cpus_allowed = Some(CpuMask::from_hex_groups(key, value)?);
                },
                "Cpus_allowed_list" => {
                    record.cpus_allowed_list = Some(CpuMask::from_ranges(key, value)?);
                },
                "voluntary_ctxt_switches" => {
                    record.voluntary_ctxt_switches = Some(parse_number(key, value)?);
                },
                "nonvoluntary_ctxt_switches" => {
                    record.nonvoluntary_ctxt_switches = Some(parse_number(key, value)?);
                },
                _ => trace!(line, key, "Skipping unsupported process status field"),
            }
        }

        // Name and pid are what identifies the process, so they are required
        record.name = name.ok_or_else(|| ParseError::missing("Name"))?;
        record.pid = pid.ok_or_else(|| ParseError::missing("Pid"))?;
        Ok(record)
    }
}
//
impl DeltaParser for Parser {
    type Delta = Delta;

    /// Context switch counters of different processes cannot be compared
    fn compatible(previous: &Record, current: &Record) -> bool {
        previous.pid == current.pid
    }

    fn delta(previous: &Record, current: &Record) -> Result<Delta, CounterReset> {
        Ok(Delta {
            voluntary_ctxt_switches: delta::optional_counter(
                "voluntary_ctxt_switches",
                previous.voluntary_ctxt_switches,
                current.voluntary_ctxt_switches,
            )?,
            nonvoluntary_ctxt_switches: delta::optional_counter(
                "nonvoluntary_ctxt_switches",
                previous.nonvoluntary_ctxt_switches,
                current.nonvoluntary_ctxt_switches,
            )?,
        })
    }
}


/// Contents of /proc/<pid>/status
///
/// Only `name` and `pid` are guaranteed to be present. Other fields depend on
/// the kernel version and configuration (e.g. kernel threads have no memory
/// statistics).
///
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Record {
    /// Command run by this process
    pub name: String,

    /// Process state, as a single letter (R, S, D, T, t, Z, X, I...)
    pub state: Option<char>,

    /// Thread group ID (i.e. process ID)
    pub tgid: Option<u32>,

    /// Thread ID
    pub pid: u32,

    /// Pid of the parent process
    pub ppid: Option<u32>,

    /// Pid of the process tracing this process (0 if not traced)
    pub tracer_pid: Option<u32>,

    /// Number of threads in the process
    pub threads: Option<u32>,

    /// Real, effective, saved set and filesystem user IDs
    pub uid: Option<[u32; 4]>,

    /// Real, effective, saved set and filesystem group IDs
    pub gid: Option<[u32; 4]>,

    /// Peak virtual memory size
    pub vm_peak: Option<ByteSize>,

    /// Virtual memory size
    pub vm_size: Option<ByteSize>,

    /// Peak resident set size ("high water mark")
    pub vm_hwm: Option<ByteSize>,

    /// Resident set size
    pub vm_rss: Option<ByteSize>,

    /// Swapped-out virtual memory size
    pub vm_swap: Option<ByteSize>,

    /// Mask of blocked signals
    pub sig_blk: Option<u64>,

    /// Mask of ignored signals
    pub sig_ign: Option<u64>,

    /// Mask of caught signals
    pub sig_cgt: Option<u64>,

    /// CPUs on which this process may run, from the hex mask
    pub cpus_allowed: Option<CpuMask>,

    /// CPUs on which this process may run, from the range list
    pub cpus_allowed_list: Option<CpuMask>,

    /// Number of voluntary context switches
    pub voluntary_ctxt_switches: Option<u64>,

    /// Number of involuntary context switches
    pub nonvoluntary_ctxt_switches: Option<u64>,
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (pid {})", self.name, self.pid)?;
        if let Some(state) = self.state {
            write!(f, ", state {}", state)?;
        }
        if let Some(vm_rss) = self.vm_rss {
            write!(f, ", RSS {}", vm_rss)?;
        }
        Ok(())
    }
}


/// Context switch counter increments of a process
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Delta {
    /// Voluntary context switches since the previous sample
    pub voluntary_ctxt_switches: Option<u64>,

    /// Involuntary context switches since the previous sample
    pub nonvoluntary_ctxt_switches: Option<u64>,
}


/// Set of CPUs, as used by affinity masks
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CpuMask {
    /// Bit N of word W is set if CPU 64*W+N belongs to the set
    words: Vec<u64>,
}
//
impl CpuMask {
    /// Decode a mask in the kernel's hexadecimal format, made of
    /// comma-separated 32-bit groups with the most significant group first
    /// (e.g. "ffffffff,00000003")
    ///
    /// Like range lists, masks cannot describe more than `MAX_CPUS` CPUs.
    pub fn from_hex_groups(field: &str, input: &str) -> Result<Self, ParseError> {
        let mut mask = CpuMask::default();
        for (index, group) in input.rsplit(',').enumerate() {
            if group.len() > 8 || index as u32 >= MAX_CPUS / 32 {
                return Err(ParseError::invalid(field, input));
            }
            let bits = parse_hex_u64(field, group)
                           .map_err(|_| ParseError::invalid(field, input))?;
            for bit in (0..32).filter(|bit| bits & (1 << bit) != 0) {
                mask.insert(index as u32 * 32 + bit);
            }
        }
        Ok(mask)
    }

    /// Decode a mask in the kernel's range list format (e.g. "0-3,8,10-11")
    pub fn from_ranges(field: &str, input: &str) -> Result<Self, ParseError> {
        let mut mask = CpuMask::default();
        if input.is_empty() {
            return Ok(mask);
        }
        let invalid = || ParseError::invalid(field, input);
        for range in input.split(',') {
            let (raw_start, raw_end) = range.split_once('-').unwrap_or((range, range));
            if !all_digits(raw_start) || !all_digits(raw_end) {
                return Err(invalid());
            }
            let start = raw_start.parse::<u32>().map_err(|_| invalid())?;
            let end = raw_end.parse::<u32>().map_err(|_| invalid())?;
            if start > end || end >= MAX_CPUS {
                return Err(invalid());
            }
            for cpu in start..=end {
                mask.insert(cpu);
            }
        }
        Ok(mask)
    }

    /// Truth that a CPU belongs to the set
    pub fn contains(&self, cpu: u32) -> bool {
        let (word, bit) = Self::position(cpu);
        self.words.get(word).map_or(false, |word| word & (1 << bit) != 0)
    }

    /// Number of CPUs in the set
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterate over the CPUs of the set, in increasing order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..64).filter(move |bit| word & (1 << bit) != 0)
                   .map(move |bit| index as u32 * 64 + bit)
        })
    }

    // INTERNAL: Add a CPU to the set
    fn insert(&mut self, cpu: u32) {
        let (word, bit) = Self::position(cpu);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    // INTERNAL: Locate a CPU's bit in the mask
    fn position(cpu: u32) -> (usize, u32) {
        ((cpu / 64) as usize, cpu % 64)
    }
}
//
impl fmt::Display for CpuMask {
    /// CPU sets are displayed in the range list format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ranges = self.iter()
                         .map(|cpu| (cpu, cpu))
                         .coalesce(|(start, end), (next, _)| {
                             if next == end + 1 {
                                 Ok((start, next))
                             } else {
                                 Err(((start, end), (next, next)))
                             }
                         })
                         .map(|(start, end)| {
                             if start == end {
                                 start.to_string()
                             } else {
                                 format!("{}-{}", start, end)
                             }
                         })
                         .join(",");
        write!(f, "{}", ranges)
    }
}

/// Upper bound on CPU indices, matching the kernel's maximal NR_CPUS
const MAX_CPUS: u32 = 8192;


/// INTERNAL: Parse the four user or group IDs of a process
fn parse_ids(key: &str, value: &str) -> Result<[u32; 4], ParseError> {
    let mut columns = value.split_ascii_whitespace();
    let mut ids = [0; 4];
    for (index, id) in ids.iter_mut().enumerate() {
        let name = || format!("{}[{}]", key, index);
        let raw = columns.next().ok_or_else(|| ParseError::missing(name()))?;
        *id = parse_number(&name(), raw)?;
    }
    Ok(ids)
}

/// INTERNAL: Parse a memory volume such as "    2640 kB"
fn parse_volume(key: &str, value: &str) -> Result<ByteSize, ParseError> {
    let mut columns = value.split_ascii_whitespace();
    let raw = columns.next().ok_or_else(|| ParseError::missing(key))?;
    match columns.next() {
        Some("kB") => parse_kib(key, raw),
        _ => Err(ParseError::invalid(key, value)),
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use bytesize::ByteSize;
    use crate::error::ParseError;
    use crate::parser::{DeltaParser, PseudoFileParser};
    use crate::pseudo_file::{PseudoFile, SchemaId};
    use super::{CpuMask, Parser, Sampler};

    /// Status of a userspace process
    const USER_STATUS: &str =
        "Name:\tcat\n\
         Umask:\t0022\n\
         State:\tR (running)\n\
         Tgid:\t1122\n\
         Pid:\t1123\n\
         PPid:\t1118\n\
         TracerPid:\t0\n\
         Uid:\t1000\t1000\t1000\t1000\n\
         Gid:\t100\t100\t100\t100\n\
         Groups:\t \n\
         VmPeak:\t    2640 kB\n\
         VmSize:\t    2600 kB\n\
         VmHWM:\t    1252 kB\n\
         VmRSS:\t    1250 kB\n\
         VmSwap:\t       0 kB\n\
         Threads:\t2\n\
         SigBlk:\t0000000000000000\n\
         SigIgn:\t0000000000001000\n\
         SigCgt:\t0000000180004002\n\
         Cpus_allowed:\tf\n\
         Cpus_allowed_list:\t0-3\n\
         voluntary_ctxt_switches:\t12\n\
         nonvoluntary_ctxt_switches:\t3\n";

    /// Check that process status is parsed correctly
    #[test]
    fn parse_status() {
        let record = Parser::parse(USER_STATUS).expect("Should parse");
        assert_eq!(record.name, "cat");
        assert_eq!(record.state, Some('R'));
        assert_eq!((record.tgid, record.pid, record.ppid), (Some(1122), 1123, Some(1118)));
        assert_eq!(record.tracer_pid, Some(0));
        assert_eq!(record.threads, Some(2));
        assert_eq!(record.uid, Some([1000; 4]));
        assert_eq!(record.gid, Some([100; 4]));
        assert_eq!(record.vm_peak, Some(ByteSize::kib(2640)));
        assert_eq!(record.vm_rss, Some(ByteSize::kib(1250)));
        assert_eq!(record.vm_swap, Some(ByteSize::kib(0)));
        assert_eq!(record.sig_ign, Some(0x1000));
        assert_eq!(record.sig_cgt, Some(0x1_8000_4002));
        assert_eq!(record.cpus_allowed, record.cpus_allowed_list);
        assert_eq!(record.cpus_allowed.as_ref().map(CpuMask::count), Some(4));
        assert_eq!(record.voluntary_ctxt_switches, Some(12));
        assert_eq!(record.nonvoluntary_ctxt_switches, Some(3));
    }

    /// Check that kernel threads, which have no memory, are supported
    #[test]
    fn kernel_thread() {
        let record = Parser::parse("Name:\tkworker/0:1-events\n\
                                    State:\tI (idle)\n\
                                    Pid:\t42\n\
                                    PPid:\t2\n")
                            .expect("Should parse");
        assert_eq!(record.name, "kworker/0:1-events");
        assert_eq!(record.state, Some('I'));
        assert_eq!(record.vm_rss, None);
        assert_eq!(record.to_string(), "kworker/0:1-events (pid 42), state I");
    }

    /// Check that broken process status is reported
    #[test]
    fn broken_status() {
        assert_eq!(Parser::parse("Pid:\t42\n"), Err(ParseError::missing("Name")));
        assert_eq!(Parser::parse("Name:\tx\n"), Err(ParseError::missing("Pid")));
        assert_eq!(Parser::parse("Name:\tx\nPid:\tabc\n"),
                   Err(ParseError::invalid("Pid", "abc")));
        assert_eq!(Parser::parse("Name:\tx\nPid:\t1\nUid:\t0\t0\t0\n"),
                   Err(ParseError::missing("Uid[3]")));
        assert_eq!(Parser::parse("Name:\tx\nPid:\t1\nVmRSS:\t12 MB\n"),
                   Err(ParseError::invalid("VmRSS", "12 MB")));
        assert_eq!(Parser::parse("Name:\tx\nPid:\t1\nSigCgt:\tzz\n"),
                   Err(ParseError::invalid("SigCgt", "zz")));
    }

    /// Check that CPU masks are decoded in both formats
    #[test]
    fn cpu_masks() {
        let hex = CpuMask::from_hex_groups("Cpus_allowed", "00000001,00000305")
                          .expect("Should parse");
        let list = CpuMask::from_ranges("Cpus_allowed_list", "0,2,8-9,32")
                           .expect("Should parse");
        assert_eq!(hex, list);
        assert!(hex.contains(8) && hex.contains(32));
        assert!(!hex.contains(1) && !hex.contains(1000));
        assert_eq!(hex.count(), 5);
        assert_eq!(hex.iter().collect::<Vec<_>>(), vec![0, 2, 8, 9, 32]);
        assert_eq!(hex.to_string(), "0,2,8-9,32");

        assert_eq!(CpuMask::from_ranges("list", ""), Ok(CpuMask::default()));
        assert_eq!(CpuMask::from_ranges("list", "3-1"),
                   Err(ParseError::invalid("list", "3-1")));
        assert_eq!(CpuMask::from_ranges("list", "0-99999"),
                   Err(ParseError::invalid("list", "0-99999")));
        assert_eq!(CpuMask::from_hex_groups("mask", "1,123456789"),
                   Err(ParseError::invalid("mask", "1,123456789")));
    }

    /// Check that both mask formats share the same upper bound on CPUs
    #[test]
    fn cpu_mask_limits() {
        // A kernel built with the maximal NR_CPUS prints 256 groups
        let widest = vec!["ffffffff"; 256].join(",");
        let mask = CpuMask::from_hex_groups("Cpus_allowed", &widest)
                           .expect("Maximal mask should parse");
        assert_eq!(mask.count(), 8192);
        assert_eq!(CpuMask::from_ranges("Cpus_allowed_list", "0-8191"), Ok(mask));

        // Anything wider is rejected, whatever its contents
        let too_wide = vec!["ffffffff"; 2000].join(",");
        assert_eq!(CpuMask::from_hex_groups("Cpus_allowed", &too_wide),
                   Err(ParseError::invalid("Cpus_allowed", &too_wide)));
        let zero_padded = vec!["00000000"; 257].join(",");
        assert_eq!(CpuMask::from_hex_groups("Cpus_allowed", &zero_padded),
                   Err(ParseError::invalid("Cpus_allowed", &zero_padded)));
        assert_eq!(CpuMask::from_ranges("Cpus_allowed_list", "8192"),
                   Err(ParseError::invalid("Cpus_allowed_list", "8192")));
    }

    /// Check that fields from newer kernels do not affect the record
    #[test]
    fn unknown_status_fields() {
        let with_extra = USER_STATUS.replace(
            "Threads:\t2\n",
            "Threads:\t2\nFutureField:\t12 kB\nSpeculation_Future:\tthing vulnerable\n"
        );
        assert_ne!(with_extra, USER_STATUS);
        assert_eq!(Parser::parse(&with_extra), Parser::parse(USER_STATUS));
        assert!(Parser::parse(USER_STATUS).is_ok());
    }

    /// Check context switch increments
    #[test]
    fn status_delta() {
        let before = Parser::parse("Name:\tx\nPid:\t7\nvoluntary_ctxt_switches:\t10\n")
                            .expect("Should parse");
        let after = Parser::parse("Name:\tx\nPid:\t7\nvoluntary_ctxt_switches:\t15\n\
                                   nonvoluntary_ctxt_switches:\t2\n")
                           .expect("Should parse");
        assert!(Parser::compatible(&before, &after));
        let delta = Parser::delta(&before, &after).expect("No counter reset");
        assert_eq!(delta.voluntary_ctxt_switches, Some(5));
        assert_eq!(delta.nonvoluntary_ctxt_switches, None);

        let other = Parser::parse("Name:\tx\nPid:\t8\n").expect("Should parse");
        assert!(!Parser::compatible(&after, &other));
    }

    /// Check that our own process and main thread can be sampled by pid
    #[test]
    fn sample_by_pid() {
        let pid = std::process::id();
        let process = PseudoFile::process(SchemaId::PidStatus, pid)
                                 .expect("Status is a per-process file");
        let record = Sampler::new(process).expect("Schema is right")
                                          .sample()
                                          .expect("Our own process is alive");
        assert_eq!(record.pid, pid);
        assert!(record.threads.map_or(true, |threads| threads >= 1));

        let thread = PseudoFile::thread(SchemaId::PidStatus, pid, pid)
                                .expect("Status is a per-thread file");
        let record = Sampler::new(thread).expect("Schema is right")
                                         .read_once()
                                         .expect("Our main thread is alive");
        assert_eq!(record.tgid, Some(pid));
    }

    define_sampler_tests!{ super::Parser, delta }
}


/// Performance benchmarks
///
/// Run them with `cargo test --release -- --ignored --nocapture`.
///
#[cfg(test)]
mod benchmarks {
    define_sampler_benchs!{ super::Parser, 200_000 }
}
