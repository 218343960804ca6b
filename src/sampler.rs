//! This module defines what a pseudo-file sampler is and how it's implemented
//!
//! Aside from a small amount of "static" system information, such as the kernel
//! version, most pseudo-files are interfaced through a sampling interface which
//! allows monitoring their time evolution.
//!
//! This sampling interface always works in the same way: read the contents of
//! the file into a reusable buffer and hand them to the parser associated with
//! the file, which produces a typed record. For files with counters, the
//! sampler additionally remembers the previous record, so that it can tell how
//! much these counters increased in between. As a consequence, it is possible
//! to standardize the sampling abstraction, which is what this module does.

use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::config::SamplerConfig;
use crate::delta::{DeltaSlot, SampleDelta};
use crate::error::{Error, ParseError};
use crate::parser::{DeltaParser, PseudoFileParser};
use crate::pseudo_file::{AccessMode, PseudoFile};
use crate::reader::RawSnapshot;


/// Mechanism for sampling measurements from a pseudo-file
///
/// The parser type `P` determines the kind of pseudo-file which is sampled
/// and the record type which is produced. For example, the invocation...
///
/// `Sampler::<procfs::meminfo::Parser>::system()`
///
/// ...builds a sampler which loads data from /proc/meminfo and produces
/// `procfs::meminfo::Record`s. Each procfs module also provides a `Sampler`
/// type alias for convenience.
///
/// A sampler only performs I/O when asked to produce a record, and every
/// failure is local to the call that produced it: the sampler remains usable
/// and the next call starts from a clean slate.
///
pub struct Sampler<P: PseudoFileParser> {
    /// Pseudo-file which is being sampled
    file: PseudoFile,

    /// Sampling tunables
    config: SamplerConfig,

    /// Contents of the last read, in a buffer which is reused across reads
    snapshot: RawSnapshot,

    /// Last record from sample_with_delta(), and the time at which it was read
    previous: Option<(P::Record, Instant)>,

    /// Parsers are stateless, we only need their type
    parser: PhantomData<fn() -> P>,
}
//
impl<P: PseudoFileParser> Sampler<P> {
    /// Create a sampler for the system-wide instance of the parser's file
    pub fn system() -> Self {
        Self::build(PseudoFile::system(P::SCHEMA), SamplerConfig::default())
    }

    /// Create a sampler for some instance of the parser's file
    pub fn new(file: PseudoFile) -> Result<Self, Error> {
        Self::with_config(file, SamplerConfig::default())
    }

    /// Create a sampler with a non-default configuration
    pub fn with_config(file: PseudoFile,
                       config: SamplerConfig) -> Result<Self, Error> {
        if file.schema() != P::SCHEMA {
            return Err(Error::SchemaMismatch {
                expected: P::SCHEMA,
                found: file.schema(),
            });
        }
        Ok(Self::build(file, config))
    }

    /// Read and parse the file, whatever its access mode
    ///
    /// This is how one-shot files, such as /proc/version, are meant to be
    /// read. Nothing is cached: every call reads the file again.
    ///
    pub fn read_once(&mut self) -> Result<P::Record, Error> {
        self.read_and_parse()
    }

    /// Acquire a new sample of data from a sampled file
    ///
    /// This does not affect the record which sample_with_delta() compares
    /// against.
    ///
    pub fn sample(&mut self) -> Result<P::Record, Error> {
        if self.file.mode() != AccessMode::Sampled {
            return Err(Error::ModeMismatch {
                path: self.file.path().to_owned(),
                mode: self.file.mode(),
            });
        }
        self.read_and_parse()
    }

    /// Time elapsed since the record which sample_with_delta() will compare
    /// against was read, if any. This grows across failed samples.
    pub fn since_previous(&self) -> Option<Duration> {
        self.previous.as_ref().map(|(_, taken_at)| taken_at.elapsed())
    }

    /// Record which sample_with_delta() will compare against, if any
    pub fn previous(&self) -> Option<&P::Record> {
        self.previous.as_ref().map(|(record, _)| record)
    }

    /// Forget about the previous record, e.g. after a long pause in sampling
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Raw contents of the last read. Empty if that read failed.
    pub fn snapshot(&self) -> &RawSnapshot {
        &self.snapshot
    }

    /// Wall clock time of the last successful read, if the last read was
    /// successful
    pub fn last_read_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.wall_clock()
    }

    /// Pseudo-file which is being sampled
    pub fn file(&self) -> &PseudoFile {
        &self.file
    }

    /// Sampling configuration
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    // INTERNAL: Build a sampler whose schema is known to be right
    fn build(file: PseudoFile, config: SamplerConfig) -> Self {
        let snapshot = RawSnapshot::with_capacity(config.initial_capacity_bytes());
        Self {
            file,
            config,
            snapshot,
            previous: None,
            parser: PhantomData,
        }
    }

    // INTERNAL: Fetch the current file contents and parse them
    fn read_and_parse(&mut self) -> Result<P::Record, Error> {
        self.snapshot.capture(self.file.path(),
                              self.config.max_buffer_bytes(),
                              self.config.retry_transient)?;
        let path = self.file.path();
        let contents = std::str::from_utf8(self.snapshot.bytes())
                                .map_err(|e| Error::Parse {
                                    path: path.to_owned(),
                                    source: ParseError::InvalidEncoding(
                                        e.valid_up_to()
                                    ),
                                })?;
        P::parse(contents).map_err(|source| Error::Parse {
            path: path.to_owned(),
            source,
        })
    }
}
//
impl<P: DeltaParser> Sampler<P> {
    /// Acquire a new sample, and tell how its counters evolved since the
    /// previous call to this method
    ///
    /// On success, the new record always becomes the reference for the next
    /// call, even if it could not be compared with the previous one. On
    /// failure, the previous reference is kept, so that the next successful
    /// call reports the increments over the whole gap.
    ///
    pub fn sample_with_delta(&mut self)
        -> Result<(P::Record, DeltaSlot<P::Delta>), Error>
    {
        let current = self.sample()?;
        let taken_at = self.snapshot.taken_at().unwrap_or_else(Instant::now);

        let slot = match self.previous.take() {
            // This is the first sample, there is nothing to compare with
            None => None,

            // The set of entities changed (hotplug, device removal...)
            Some((ref previous, _)) if !P::compatible(previous, &current) => {
                debug!(path = %self.file.path().display(),
                       "Sampled entities changed, skipping delta computation");
                None
            },

            // Compute the counter increments
            Some((ref previous, previous_at)) => {
                match P::delta(previous, &current) {
                    Ok(changes) => Some(Ok(SampleDelta {
                        elapsed: taken_at.saturating_duration_since(previous_at),
                        changes,
                    })),
                    Err(reset) => {
                        warn!(path = %self.file.path().display(),
                              counter = %reset.counter,
                              previous = reset.previous,
                              current = reset.current,
                              "Counter reset detected, restarting delta tracking");
                        Some(Err(reset))
                    },
                }
            },
        };

        self.previous = Some((current.clone(), taken_at));
        Ok((current, slot))
    }
}


/// Generate the tests associated with a certain pseudo-file parser
///
/// This macro should be invoked inside of the module associated with the unit
/// tests for a certain pseudo-file. The tests run against the host's procfs.
/// Add the "delta" keyword for parsers which implement DeltaParser.
///
macro_rules! define_sampler_tests {
    ($parser:ty) => {
        /// Check that sampler initialization works well
        #[test]
        fn init_sampler() {
            let sampler = $crate::sampler::Sampler::<$parser>::system();
            assert!(sampler.snapshot().taken_at().is_none());
            assert!(sampler.previous().is_none());
        }

        /// Check that basic sampling works as expected
        #[test]
        fn basic_sampling() {
            let mut sampler = $crate::sampler::Sampler::<$parser>::system();
            sampler.read_once().expect("Failed to acquire a first sample");
            assert!(!sampler.snapshot().bytes().is_empty());
            sampler.read_once().expect("Failed to acquire a second sample");
            assert!(sampler.snapshot().taken_at().is_some());
        }
    };
    ($parser:ty, delta) => {
        define_sampler_tests!{ $parser }

        /// Check that delta sampling works as expected
        #[test]
        fn delta_sampling() {
            let mut sampler = $crate::sampler::Sampler::<$parser>::system();
            let (_, first) = sampler.sample_with_delta()
                                    .expect("Failed to acquire a first sample");
            assert!(first.is_none());
            let (record, _) = sampler.sample_with_delta()
                                     .expect("Failed to acquire a second sample");
            assert_eq!(sampler.previous(), Some(&record));
        }
    };
}


/// Generate the performance benchmarks associated with a certain parser
///
/// This macro should be invoked inside of the module associated with the
/// benchmarks for a certain pseudo-file.
///
/// The macro parameters are the parser type and the number of benchmark
/// iterations to be carried out.
///
macro_rules! define_sampler_benchs {
    ($parser:ty, $bench_iters:expr) => {
        /// Benchmark for the raw pseudo-file readout overhead
        #[test]
        #[ignore]
        fn readout_overhead() {
            use $crate::parser::PseudoFileParser;
            let path = std::path::Path::new(
                <$parser as PseudoFileParser>::SCHEMA.default_path()
            );
            let mut buffer = Vec::new();
            testbench::benchmark($bench_iters, || {
                $crate::reader::read_into(path, &mut buffer, 1 << 24, true)
                               .expect("Failed to read pseudo-file");
            });
        }

        /// Benchmark for the full pseudo-file sampling overhead
        #[test]
        #[ignore]
        fn sampling_overhead() {
            let mut sampler = $crate::sampler::Sampler::<$parser>::system();
            testbench::benchmark($bench_iters, || {
                sampler.read_once().expect("Failed to sample data");
            });
        }
    }
}
