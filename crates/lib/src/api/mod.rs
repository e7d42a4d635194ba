//! Contract versions and version-keyed strategy selection.
//!
//! Every compatibility decision in the lifecycle is keyed on a two-part
//! [`Version`]. Strategies are selected through a [`TierTable`]: an ordered
//! list of `(minimum version, strategy)` rows where the row with the greatest
//! minimum not exceeding the requested version wins. Adding a new upper tier
//! never changes the selection for versions below it.

mod version;

pub use version::{Version, VersionError};

/// Buildpack APIs this engine can run.
pub const BUILDPACK_APIS: Apis = Apis {
  supported: &[
    Version::new(0, 2),
    Version::new(0, 3),
    Version::new(0, 4),
    Version::new(0, 5),
    Version::new(0, 6),
    Version::new(0, 7),
  ],
  deprecated: &[],
};

/// Platform APIs this engine can serve.
pub const PLATFORM_APIS: Apis = Apis {
  supported: &[
    Version::new(0, 3),
    Version::new(0, 4),
    Version::new(0, 5),
    Version::new(0, 6),
    Version::new(0, 7),
    Version::new(0, 8),
    Version::new(0, 9),
  ],
  deprecated: &[],
};

/// A set of supported and deprecated contract versions.
#[derive(Debug, Clone, Copy)]
pub struct Apis {
  pub supported: &'static [Version],
  pub deprecated: &'static [Version],
}

impl Apis {
  /// Whether `version` is one of the supported versions.
  ///
  /// Pre-1.0 versions must match exactly; from 1.0 a supported version
  /// covers every later minor of the same major.
  pub fn is_supported(&self, version: &Version) -> bool {
    self.supported.iter().any(|s| compatible(s, version))
  }

  pub fn is_deprecated(&self, version: &Version) -> bool {
    self.deprecated.iter().any(|d| compatible(d, version))
  }
}

fn compatible(supported: &Version, requested: &Version) -> bool {
  if supported.major == 0 {
    return supported == requested;
  }
  supported.major == requested.major && requested.minor >= supported.minor
}

/// Ordered table mapping version lower bounds to strategies.
///
/// Rows must be sorted by ascending minimum version.
#[derive(Debug)]
pub struct TierTable<T: 'static> {
  rows: &'static [(Version, T)],
}

impl<T> TierTable<T> {
  pub const fn new(rows: &'static [(Version, T)]) -> Self {
    Self { rows }
  }

  /// Returns the strategy of the highest tier whose minimum is `<= version`.
  ///
  /// `None` only when `version` is below the first row.
  pub fn select(&self, version: &Version) -> Option<&'static T> {
    self
      .rows
      .iter()
      .rev()
      .find(|(minimum, _)| version.at_least(minimum))
      .map(|(_, strategy)| strategy)
  }
}
