use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing a contract version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
  /// The string is not of the form `[v]<major>[.<minor>]`.
  #[error("could not parse '{0}' as version")]
  Format(String),
}

/// A two-part (`major.minor`) contract revision.
///
/// Ordering is strictly numeric, major first: `0.9 < 0.10`. There are no
/// pre-release or build suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
  pub major: u32,
  pub minor: u32,
}

impl Version {
  pub const fn new(major: u32, minor: u32) -> Self {
    Self { major, minor }
  }

  /// Parse `[v]<major>[.<minor>]`. A missing minor is 0.
  pub fn parse(s: &str) -> Result<Self, VersionError> {
    let format_err = || VersionError::Format(s.to_string());
    let trimmed = s.strip_prefix('v').unwrap_or(s);

    let (major, minor) = match trimmed.split_once('.') {
      Some((major, minor)) => (major, minor),
      None => (trimmed, ""),
    };

    if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
      return Err(format_err());
    }
    if !minor.bytes().all(|b| b.is_ascii_digit()) {
      return Err(format_err());
    }

    let major = major.parse::<u32>().map_err(|_| format_err())?;
    let minor = if minor.is_empty() {
      0
    } else {
      minor.parse::<u32>().map_err(|_| format_err())?
    };

    Ok(Self { major, minor })
  }

  pub fn less_than(&self, other: &Version) -> bool {
    self < other
  }

  pub fn at_least(&self, other: &Version) -> bool {
    self >= other
  }

  pub fn equal(&self, other: &Version) -> bool {
    self == other
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.major, self.minor)
  }
}

impl FromStr for Version {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Version::parse(s)
  }
}

impl TryFrom<String> for Version {
  type Error = VersionError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Version::parse(&value)
  }
}

impl From<Version> for String {
  fn from(value: Version) -> Self {
    value.to_string()
  }
}
