use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const COMPONENT_COUNT: usize = 4;

/// A four-component version (`major.minor.build.revision`) derived from a
/// release tag.
///
/// Missing trailing components are zero, so `v1.2` and `1.2.0.0` are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version format '{input}': {reason}")]
    InvalidFormat { input: String, reason: &'static str },
}

impl VersionError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
            reason,
        }
    }
}

impl Version {
    #[must_use]
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a tag such as `v1.2.3-rc1` into a version.
    ///
    /// Everything from the first `-` (past the first character) is ignored,
    /// then leading `v` characters are dropped.
    ///
    /// # Errors
    /// Returns [`VersionError::InvalidFormat`] when a component is empty or not
    /// a non-negative integer, or when more than four components are present.
    pub fn parse(tag: &str) -> Result<Self, VersionError> {
        let trimmed = tag.trim();
        let without_suffix = match trimmed.find('-') {
            Some(idx) if idx > 0 => &trimmed[..idx],
            _ => trimmed,
        };
        let core = without_suffix.trim_start_matches('v');

        if core.is_empty() {
            return Err(VersionError::invalid(tag, "no version components"));
        }

        let mut components = [0_u32; COMPONENT_COUNT];
        for (index, part) in core.split('.').enumerate() {
            if index >= COMPONENT_COUNT {
                return Err(VersionError::invalid(tag, "more than four components"));
            }
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::invalid(tag, "component is not numeric"));
            }
            components[index] = part
                .parse()
                .map_err(|_| VersionError::invalid(tag, "component is out of range"))?;
        }

        let [major, minor, build, revision] = components;
        Ok(Self::new(major, minor, build, revision))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl TryFrom<&semver::Version> for Version {
    type Error = VersionError;

    fn try_from(value: &semver::Version) -> Result<Self, Self::Error> {
        let component = |n: u64| {
            u32::try_from(n)
                .map_err(|_| VersionError::invalid(&value.to_string(), "component is out of range"))
        };
        Ok(Self::new(
            component(value.major)?,
            component(value.minor)?,
            component(value.patch)?,
            0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{Version, VersionError};

    #[test]
    fn pads_missing_components_with_zero() {
        assert_eq!(Version::parse("0").unwrap(), Version::new(0, 0, 0, 0));
        assert_eq!(Version::parse("1.2").unwrap(), Version::new(1, 2, 0, 0));
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3, 0));
        assert_eq!(Version::parse("1.2.3.4").unwrap(), Version::new(1, 2, 3, 4));
    }

    #[test]
    fn strips_prefix_and_prerelease_suffix() {
        let plain = Version::parse("v1.2.1").unwrap();
        assert_eq!(Version::parse("v1.2.1-rc1").unwrap(), plain);
        assert_eq!(Version::parse("1.2.1-beta-2").unwrap(), plain);
        assert_eq!(Version::parse("  v1.2.1  ").unwrap(), plain);
    }

    #[test]
    fn rejects_malformed_tags() {
        for tag in ["", "v", "1.2.3.4.5", "1..2", "1.x", "release-1.0", "-1.0", "1.+2"] {
            let result = Version::parse(tag);
            assert!(
                matches!(result, Err(VersionError::InvalidFormat { .. })),
                "{tag:?} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn rejects_components_that_overflow() {
        assert!(Version::parse("4294967296").is_err());
        assert!(Version::parse("4294967295").is_ok());
    }

    #[test]
    fn ordering_is_most_significant_first() {
        let older = Version::parse("1.2.9").unwrap();
        let newer = Version::parse("1.10").unwrap();
        assert_eq!(older.cmp(&newer), Ordering::Less);
        assert_eq!(newer.cmp(&newer), Ordering::Equal);
        assert!(Version::parse("2").unwrap() > Version::parse("1.99.99.99").unwrap());
        assert!(Version::parse("1.0.0.1").unwrap() > Version::parse("1").unwrap());
    }

    #[test]
    fn equality_is_after_normalization() {
        assert_eq!(Version::parse("1.2").unwrap(), Version::parse("v1.2.0.0").unwrap());
        assert_ne!(Version::parse("1.2").unwrap(), Version::parse("1.2.0.1").unwrap());
    }

    #[test]
    fn display_uses_four_components() {
        assert_eq!(Version::parse("v3").unwrap().to_string(), "3.0.0.0");
    }

    #[test]
    fn converts_from_semver() {
        let semver = semver::Version::parse("0.4.1-alpha.1").unwrap();
        assert_eq!(Version::try_from(&semver).unwrap(), Version::new(0, 4, 1, 0));
    }
}
