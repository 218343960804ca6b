//! Identity of the pseudo-files that we know how to sample
//!
//! A `PseudoFile` tells the sampling machinery three things: where the file
//! lives, whether it is worth reading more than once, and which grammar its
//! contents follow. It is built once per monitored file and never modified.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::Error;


/// How often a pseudo-file is expected to be read
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Contents are constant for the monitoring session (e.g. kernel version)
    OneShot,

    /// Contents evolve and are re-read on every tick (e.g. CPU counters)
    Sampled,
}


/// Catalog of supported pseudo-file kinds
///
/// Each kind is associated with exactly one parser in the procfs module.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum SchemaId {
    Uptime,
    Version,
    Stat,
    MemInfo,
    VmStat,
    DiskStats,
    LoadAvg,
    CpuInfo,
    PidStatus,
}
//
impl SchemaId {
    /// Where the system-wide instance of this file lives. For per-process
    /// files, this is the instance of the calling process.
    pub fn default_path(self) -> &'static str {
        match self {
            SchemaId::Uptime    => "/proc/uptime",
            SchemaId::Version   => "/proc/version",
            SchemaId::Stat      => "/proc/stat",
            SchemaId::MemInfo   => "/proc/meminfo",
            SchemaId::VmStat    => "/proc/vmstat",
            SchemaId::DiskStats => "/proc/diskstats",
            SchemaId::LoadAvg   => "/proc/loadavg",
            SchemaId::CpuInfo   => "/proc/cpuinfo",
            SchemaId::PidStatus => "/proc/self/status",
        }
    }

    /// How this file is normally accessed
    pub fn default_mode(self) -> AccessMode {
        match self {
            SchemaId::Version | SchemaId::CpuInfo => AccessMode::OneShot,
            _ => AccessMode::Sampled,
        }
    }

    /// Name of the file inside of /proc/<pid>/, for per-process files
    pub fn process_file(self) -> Option<&'static str> {
        match self {
            SchemaId::PidStatus => Some("status"),
            _ => None,
        }
    }
}


/// A kernel-exposed source of data: location, access mode and grammar
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PseudoFile {
    /// Absolute location of the file
    path: PathBuf,

    /// Whether the file is read once or sampled
    mode: AccessMode,

    /// Grammar of the file contents
    schema: SchemaId,
}
//
impl PseudoFile {
    /// Describe an arbitrary file following a known grammar
    pub fn new<P: Into<PathBuf>>(path: P,
                                 mode: AccessMode,
                                 schema: SchemaId) -> Self {
        Self {
            path: path.into(),
            mode,
            schema,
        }
    }

    /// Describe the system-wide instance of a pseudo-file
    pub fn system(schema: SchemaId) -> Self {
        Self::new(schema.default_path(), schema.default_mode(), schema)
    }

    /// Describe the instance of a per-process pseudo-file for process `pid`
    pub fn process(schema: SchemaId, pid: u32) -> Result<Self, Error> {
        let file_name = schema.process_file()
                              .ok_or(Error::NotProcessScoped(schema))?;
        let path = Path::new("/proc").join(pid.to_string()).join(file_name);
        Ok(Self::new(path, schema.default_mode(), schema))
    }

    /// Describe the instance of a per-process pseudo-file for thread `tid`
    /// of process `pid`
    pub fn thread(schema: SchemaId, pid: u32, tid: u32) -> Result<Self, Error> {
        let file_name = schema.process_file()
                              .ok_or(Error::NotProcessScoped(schema))?;
        let path = Path::new("/proc").join(pid.to_string())
                                     .join("task")
                                     .join(tid.to_string())
                                     .join(file_name);
        Ok(Self::new(path, schema.default_mode(), schema))
    }

    /// Same file, accessed in a different mode
    pub fn with_mode(self, mode: AccessMode) -> Self {
        Self { mode, ..self }
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access mode of the file
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Grammar of the file
    pub fn schema(&self) -> SchemaId {
        self.schema
    }
}
