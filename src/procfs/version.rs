//! This module contains a parser for /proc/version
//!
//! Since the kernel version is not expected to change during a normal
//! performance measurement, this file is not designed for sampling, unlike
//! others, but only for a one-time readout that subsequently gets re-used.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use crate::error::{Error, ParseError};
use crate::parser::PseudoFileParser;
use crate::pseudo_file::SchemaId;


/// Reader for /proc/version (one-shot by default)
pub type Sampler = crate::sampler::Sampler<Parser>;


lazy_static! {
    /// Ultimately, the contents of /proc/version should match this regex
    static ref VERSION_REGEX: Regex = Regex::new(
        r"^Linux version (?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<bugfix>\d+))?(?:[-.+](?P<distro_flavour>\S*))? (?P<build_info>.+)$"
    ).expect("The kernel version regex should be valid");

    /// We should only need to parse the host's kernel version once
    static ref HOST_VERSION: Result<LinuxVersion, Error> =
        Sampler::system().read_once();
}


/// Kernel version of the host, read from /proc/version on first use
pub fn host_version() -> Result<&'static LinuxVersion, &'static Error> {
    HOST_VERSION.as_ref()
}


/// Parser for /proc/version
pub struct Parser;
//
impl PseudoFileParser for Parser {
    type Record = LinuxVersion;
    const SCHEMA: SchemaId = SchemaId::Version;

    fn parse(file_contents: &str) -> Result<LinuxVersion, ParseError> {
        let trimmed_version = file_contents.trim();
        let captures = VERSION_REGEX.captures(trimmed_version).ok_or_else(|| {
            ParseError::MalformedLine(1, trimmed_version.to_owned())
        })?;

        // Version numbers are made of digits, but may still overflow
        let number = |field: &str| -> Result<u16, ParseError> {
            match captures.name(field) {
                Some(raw) => raw.as_str()
                                .parse()
                                .map_err(|_| ParseError::invalid(field, raw.as_str())),
                None => Ok(0),
            }
        };

        Ok(LinuxVersion {
            major: number("major")?,
            minor: number("minor")?,
            bugfix: number("bugfix")?,
            distro_flavour: captures.name("distro_flavour")
                                    .map(|m| m.as_str())
                                    .filter(|flavour| !flavour.is_empty())
                                    .map(str::to_owned),
            build_info: captures["build_info"].to_owned(),
        })
    }
}


/// Kernel versioning information
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LinuxVersion {
    /// Upstream kernel version, following Linux 3.x style
    ///
    /// Be warned that in the pre-3.0 era, these numbers actually had different
    /// semantics: the third "bugfix" number was actually used for feature
    /// releases, and a fourth version number was used for bugfixes.
    ///
    /// Because Linux 2.6 has long been unmaintained, not fully supporting its
    /// versioning scheme is considered acceptable.
    ///
    pub major: u16,
    pub minor: u16,
    pub bugfix: u16,

    /// Distribution-specific versioning information and kernel flavours,
    /// which are not parsed further (e.g. "1-amd64", "fc-v139")
    pub distro_flavour: Option<String>,

    /// Build information (host, compiler, date...), not parsed either
    pub build_info: String,
}
//
impl LinuxVersion {
    /// Check if we are using at least a certain kernel version (included)
    pub fn greater_eq(&self, major: u16, minor: u16, bugfix: u16) -> bool {
        (self.major, self.minor, self.bugfix) >= (major, minor, bugfix)
    }

    /// Check if we are below a certain kernel version (excluded)
    pub fn smaller(&self, major: u16, minor: u16, bugfix: u16) -> bool {
        !self.greater_eq(major, minor, bugfix)
    }
}
//
impl fmt::Display for LinuxVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Linux {}.{}.{}", self.major, self.minor, self.bugfix)?;
        if let Some(ref flavour) = self.distro_flavour {
            write!(f, "-{}", flavour)?;
        }
        Ok(())
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::error::ParseError;
    use crate::parser::PseudoFileParser;
    use super::{host_version, LinuxVersion, Parser};

    /// Build information used by the tests below
    const BUILD_INFO: &str = "(gralouf@yolo) #1 Sat May 14 01:51:54 UTC 2048";

    /// Build a version record for comparison purposes
    fn version(major: u16,
               minor: u16,
               bugfix: u16,
               distro_flavour: Option<&str>) -> LinuxVersion {
        LinuxVersion {
            major,
            minor,
            bugfix,
            distro_flavour: distro_flavour.map(str::to_owned),
            build_info: BUILD_INFO.to_owned(),
        }
    }

    /// Test the linux kernel version string parser
    #[test]
    fn parse_version() {
        let parse = |numbers: &str| {
            Parser::parse(&format!("Linux version {} {}\n", numbers, BUILD_INFO))
        };

        // No bugfix version and no flavour
        assert_eq!(parse("4.2"), Ok(version(4, 2, 0, None)));

        // A bugfix version, but no flavour
        assert_eq!(parse("4.2.7"), Ok(version(4, 2, 7, None)));

        // A flavour, but no bugfix version
        assert_eq!(parse("4.2-yeah"), Ok(version(4, 2, 0, Some("yeah"))));

        // Both a flavour and a bugfix version
        assert_eq!(parse("4.2.9-wooo"), Ok(version(4, 2, 9, Some("wooo"))));

        // Flavours come in many shapes
        assert_eq!(parse("6.18.44-fc-v139"), Ok(version(6, 18, 44, Some("fc-v139"))));
        assert_eq!(parse("5.15.0+"), Ok(version(5, 15, 0, None)));
        assert_eq!(parse("3.10.0.el7"), Ok(version(3, 10, 0, Some("el7"))));
    }

    /// Check that unexpected contents are reported
    #[test]
    fn broken_version() {
        assert_eq!(Parser::parse("FreeBSD 13.2\n"),
                   Err(ParseError::MalformedLine(1, "FreeBSD 13.2".to_owned())));
        assert_eq!(Parser::parse(""),
                   Err(ParseError::MalformedLine(1, String::new())));
        assert_eq!(Parser::parse("Linux version 99999.1 (a@b) #1\n"),
                   Err(ParseError::invalid("major", "99999")));
    }

    /// Check that reading the kernel version string of the host works
    #[test]
    fn load_host_version() {
        let host = host_version().expect("Failed to read the host version");
        assert!(host.greater_eq(2, 6, 0));
        assert_eq!(host_version().ok(), Some(host));
        assert!(host.to_string().starts_with("Linux "));
    }

    /// Check that kernel version compatibility checks work
    #[test]
    fn check_version_compatibility() {
        // Let's build an arbitrary kernel version struct
        let version = version(4, 2, 5, None);

        // Check "greater than or equal" version constraint
        assert!(!version.greater_eq(4, 2, 6));
        assert!(version.greater_eq(4, 2, 5));
        assert!(version.greater_eq(4, 2, 4));
        assert!(!version.greater_eq(4, 3, 5));
        assert!(version.greater_eq(4, 1, 6));
        assert!(!version.greater_eq(5, 2, 5));
        assert!(version.greater_eq(3, 3, 6));

        // Check "smaller than" version constraint
        assert!(version.smaller(4, 2, 6));
        assert!(!version.smaller(4, 2, 5));
        assert!(!version.smaller(4, 2, 4));
        assert!(version.smaller(4, 3, 5));
        assert!(!version.smaller(4, 1, 6));
        assert!(version.smaller(5, 2, 5));
        assert!(!version.smaller(3, 3, 6));
    }

    /// Check the human-readable version
    #[test]
    fn display_version() {
        assert_eq!(version(4, 2, 9, Some("wooo")).to_string(), "Linux 4.2.9-wooo");
        assert_eq!(version(5, 10, 0, None).to_string(), "Linux 5.10.0");
    }

    define_sampler_tests!{ super::Parser }
}


/// Performance benchmarks
///
/// Run them with `cargo test --release -- --ignored --nocapture`.
///
#[cfg(test)]
mod benchmarks {
    define_sampler_benchs!{ super::Parser, 1_000_000 }
}
