//! Sampler configuration
//!
//! The defaults are meant to work for every pseudo-file found in practice, so
//! most users will never need to touch this. It derives Deserialize so that
//! monitoring tools can expose it in their own configuration files.

use bytesize::ByteSize;
use serde::Deserialize;


/// Tunables of a pseudo-file sampler
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    /// Largest file that we agree to read. Anything larger is reported as
    /// truncated rather than silently cut, as it most likely points to a
    /// misconfiguration (e.g. sampling a regular file by mistake).
    pub max_buffer_size: ByteSize,

    /// Amount of readout buffer to allocate upfront. The buffer then grows
    /// as needed, and is reused from one sample to the next.
    pub initial_capacity: ByteSize,

    /// Retry a read once when the kernel reports a transient failure
    pub retry_transient: bool,
}
//
impl SamplerConfig {
    /// Maximal buffer size, in bytes
    pub(crate) fn max_buffer_bytes(&self) -> usize {
        usize::try_from(self.max_buffer_size.as_u64()).unwrap_or(usize::MAX)
    }

    /// Initial buffer capacity, in bytes, never above the maximal size
    pub(crate) fn initial_capacity_bytes(&self) -> usize {
        let initial = usize::try_from(self.initial_capacity.as_u64())
                           .unwrap_or(usize::MAX);
        initial.min(self.max_buffer_bytes())
    }
}
//
impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            // The largest /proc/stat seen on big NUMA boxes is a few MiB
            max_buffer_size: ByteSize::mib(16),
            initial_capacity: ByteSize::kib(4),
            retry_transient: true,
        }
    }
}
