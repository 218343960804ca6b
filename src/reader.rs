//! A sampling-oriented reader for Linux pseudo-files
//!
//! Linux pseudo-files, such as those from /proc, have a number of special
//! characteristics that are best accounted for through a special abstraction
//! when performing sampling measurements:
//!
//! - They are small (a few kB at most), so it is best to read them in one go.
//! - They do not live on hardware devices, but are generated on the host CPU.
//!   So there is no performance benefit in reading them asynchronously.
//! - They almost exclusively contain ASCII-encoded text.
//! - Their size does not vary much. So a buffer which was large enough for one
//!   read is likely to be suitable for the next read.
//! - Seeking back to the beginning of an open handle does not reliably
//!   regenerate their contents across all formats, and per-process files
//!   vanish with their process, so we open them afresh on every read.
//! - Their format is part of the kernel ABI, and is thus expected to only be
//!   modified through backwards-compatible extensions.
//!
//! The reader that is provided in this module is designed to properly account
//! for these characteristics: it fills a caller-provided buffer, which the
//! caller reuses from one read to the next, and classifies failures so that
//! a vanished process can be told apart from a real problem.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use std::time::Instant;
use tracing::trace;
use crate::error::ReadError;


/// Read the full current contents of a pseudo-file into `buffer`
///
/// The buffer is cleared first, then filled with at most `limit` bytes. If
/// the file turns out to be larger than that, `ReadError::Truncated` is
/// returned. On success, the buffer holds the complete file contents and the
/// amount of bytes that were read is returned.
///
/// Transient failures are retried once if `retry_transient` is set.
///
pub fn read_into(path: &Path,
                 buffer: &mut Vec<u8>,
                 limit: usize,
                 retry_transient: bool) -> Result<usize, ReadError> {
    // Try to read the file, retrying once on transient errors if allowed
    let first_attempt = read_attempt(path, buffer, limit);
    let outcome = match first_attempt {
        Err(ref e) if retry_transient && is_transient(e) => {
            trace!(path = %path.display(), error = %e,
                   "Transient read failure, retrying once");
            read_attempt(path, buffer, limit)
        },
        other => other,
    };

    // Classify the I/O errors, if any
    let bytes_read = outcome.map_err(|e| classify(path, e))?;

    // Reject files that exceed the configured size limit
    if bytes_read > limit {
        buffer.truncate(limit);
        return Err(ReadError::Truncated {
            path: path.to_owned(),
            limit,
        });
    }

    trace!(path = %path.display(), bytes_read, "Read pseudo-file");
    Ok(bytes_read)
}

/// INTERNAL: Open the file and read up to one byte past the limit, so that
///           oversized files can be detected without reading them fully.
fn read_attempt(path: &Path,
                buffer: &mut Vec<u8>,
                limit: usize) -> io::Result<usize> {
    buffer.clear();
    let file = File::open(path)?;
    let max_bytes = u64::try_from(limit).unwrap_or(u64::MAX)
                                        .saturating_add(1);
    file.take(max_bytes).read_to_end(buffer)
}

/// INTERNAL: Tell whether an I/O error is worth a second try
fn is_transient(error: &io::Error) -> bool {
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
            => true,
        _ => error.raw_os_error() == Some(libc::EAGAIN),
    }
}

/// INTERNAL: Translate an I/O error into our error taxonomy
fn classify(path: &Path, error: io::Error) -> ReadError {
    let path = path.to_owned();
    match (error.kind(), error.raw_os_error()) {
        // A process may exit between the open() and the read() of one of its
        // files, in which case the kernel reports ESRCH instead of ENOENT
        (ErrorKind::NotFound, _) | (_, Some(libc::ESRCH))
            => ReadError::NotFound(path),
        (ErrorKind::PermissionDenied, _) | (_, Some(libc::EPERM))
            => ReadError::PermissionDenied(path),
        _ if is_transient(&error)
            => ReadError::TransientReadError { path, source: error },
        _ => ReadError::Io { path, source: error },
    }
}


/// The exact contents of a pseudo-file at one point in time
///
/// A sampler owns one snapshot and refills it on every read. The allocation
/// is recycled, but logically each read produces a new snapshot: its content
/// is never modified after capture, only replaced by the next capture.
///
#[derive(Debug)]
pub struct RawSnapshot {
    /// Raw file contents
    bytes: Vec<u8>,

    /// Monotonic time at which the read completed, if it ever did
    taken_at: Option<Instant>,

    /// Wall clock time at which the read completed, for reporting purposes
    wall_clock: Option<DateTime<Utc>>,
}
//
impl RawSnapshot {
    /// Prepare an empty snapshot with some initial buffer capacity
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            taken_at: None,
            wall_clock: None,
        }
    }

    /// Replace the snapshot with the current contents of a file
    ///
    /// On failure, the snapshot is left empty and undated, so that stale
    /// contents can never be mistaken for fresh ones.
    pub(crate) fn capture(&mut self,
                          path: &Path,
                          limit: usize,
                          retry_transient: bool) -> Result<usize, ReadError> {
        self.taken_at = None;
        self.wall_clock = None;
        match read_into(path, &mut self.bytes, limit, retry_transient) {
            Ok(bytes_read) => {
                self.taken_at = Some(Instant::now());
                self.wall_clock = Some(Utc::now());
                Ok(bytes_read)
            },
            Err(e) => {
                self.bytes.clear();
                Err(e)
            },
        }
    }

    /// Raw contents of the file
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Monotonic capture time (None if no successful capture happened yet)
    pub fn taken_at(&self) -> Option<Instant> {
        self.taken_at
    }

    /// Wall clock capture time (None if no successful capture happened yet)
    pub fn wall_clock(&self) -> Option<DateTime<Utc>> {
        self.wall_clock
    }

    /// Capacity of the underlying buffer, for allocation-reuse checks
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use std::io::{self, ErrorKind, Write};
    use std::path::Path;
    use std::thread;
    use std::time::Duration;
    use crate::error::ReadError;
    use super::{classify, is_transient, read_into, RawSnapshot};

    /// Check that reading /proc/uptime works as expected
    #[test]
    fn read_uptime() {
        let mut buffer = Vec::new();
        let bytes_read = read_into(Path::new("/proc/uptime"),
                                   &mut buffer,
                                   4096,
                                   true)
                            .expect("Should be able to read /proc/uptime");
        assert_eq!(bytes_read, buffer.len());
        assert!(bytes_read > 0);
    }

    /// Check that two uptime measurements separated by some sleep differ
    #[test]
    fn uptime_sampling() {
        let mut snapshot = RawSnapshot::with_capacity(64);
        snapshot.capture(Path::new("/proc/uptime"), 4096, true)
                .expect("Should be able to read uptime once");
        let meas1 = snapshot.bytes().to_owned();
        let time1 = snapshot.taken_at().expect("Capture should be dated");

        thread::sleep(Duration::from_millis(50));

        snapshot.capture(Path::new("/proc/uptime"), 4096, true)
                .expect("Should be able to read uptime twice");
        assert!(meas1 != snapshot.bytes(), "Uptime should change over time");
        assert!(snapshot.taken_at().expect("Capture should be dated") > time1);
    }

    /// Check that missing files are reported as such
    #[test]
    fn missing_file() {
        let mut buffer = b"stale".to_vec();
        let result = read_into(Path::new("/proc/this/does/not/exist"),
                               &mut buffer,
                               4096,
                               true);
        match result {
            Err(ReadError::NotFound(path)) => {
                assert_eq!(path, Path::new("/proc/this/does/not/exist"));
            },
            other => panic!("Unexpected result {:?}", other),
        }
        assert!(buffer.is_empty(), "Stale contents should be discarded");
    }

    /// Check that OS errors are mapped to the right kind of read error
    #[test]
    fn error_classification() {
        let path = Path::new("/proc/1234/status");
        let classify_errno = |errno| classify(path, io::Error::from_raw_os_error(errno));

        // A process which exits mid-read is reported as gone
        for errno in [libc::ENOENT, libc::ESRCH] {
            match classify_errno(errno) {
                ReadError::NotFound(reported) => assert_eq!(reported, path),
                other => panic!("Unexpected error {:?} for errno {}", other, errno),
            }
        }

        // Both flavours of access denial are reported the same way
        for errno in [libc::EACCES, libc::EPERM] {
            match classify_errno(errno) {
                ReadError::PermissionDenied(reported) => assert_eq!(reported, path),
                other => panic!("Unexpected error {:?} for errno {}", other, errno),
            }
        }

        // Transient failures keep their cause around
        for errno in [libc::EAGAIN, libc::ETIMEDOUT, libc::EINTR] {
            match classify_errno(errno) {
                ReadError::TransientReadError { path: reported, source } => {
                    assert_eq!(reported, path);
                    assert_eq!(source.raw_os_error(), Some(errno));
                },
                other => panic!("Unexpected error {:?} for errno {}", other, errno),
            }
        }

        // Everything else is a plain I/O error
        match classify_errno(libc::EIO) {
            ReadError::Io { source, .. } => assert_eq!(source.raw_os_error(),
                                                       Some(libc::EIO)),
            other => panic!("Unexpected error {:?}", other),
        }
    }

    /// Check which I/O errors are worth retrying
    #[test]
    fn transient_errors() {
        for errno in [libc::EAGAIN, libc::EWOULDBLOCK, libc::ETIMEDOUT, libc::EINTR] {
            assert!(is_transient(&io::Error::from_raw_os_error(errno)),
                    "errno {} should be retried", errno);
        }
        for kind in [ErrorKind::WouldBlock, ErrorKind::TimedOut, ErrorKind::Interrupted] {
            assert!(is_transient(&io::Error::from(kind)), "{:?} should be retried", kind);
        }
        for errno in [libc::ENOENT, libc::ESRCH, libc::EACCES, libc::EPERM, libc::EIO] {
            assert!(!is_transient(&io::Error::from_raw_os_error(errno)),
                    "errno {} should not be retried", errno);
        }
        assert!(!is_transient(&io::Error::from(ErrorKind::InvalidData)));
    }

    /// Check that oversized files are rejected instead of being cut
    #[test]
    fn oversized_file() {
        let mut file = tempfile::NamedTempFile::new()
                                 .expect("Failed to create a temporary file");
        file.write_all(b"0123456789").expect("Failed to write temporary file");

        let mut buffer = Vec::new();
        assert_eq!(read_into(file.path(), &mut buffer, 10, true)
                            .expect("Exactly-sized file should be accepted"),
                   10);
        assert_eq!(buffer, b"0123456789");

        match read_into(file.path(), &mut buffer, 9, true) {
            Err(ReadError::Truncated { limit, .. }) => assert_eq!(limit, 9),
            other => panic!("Unexpected result {:?}", other),
        }
    }

    /// Check that a failed capture does not leave stale contents behind
    #[test]
    fn failed_capture() {
        let mut snapshot = RawSnapshot::with_capacity(64);
        snapshot.capture(Path::new("/proc/uptime"), 4096, true)
                .expect("Should be able to read uptime");
        assert!(snapshot.capture(Path::new("/proc/nonexistent"), 4096, true)
                        .is_err());
        assert!(snapshot.bytes().is_empty());
        assert_eq!(snapshot.taken_at(), None);
        assert_eq!(snapshot.wall_clock(), None);
    }
}
