//! The platform side of the contract.
//!
//! The platform API selects defaults for file locations, which phases own
//! layer restoration, and the exit code each failure maps to.

mod metadata;

pub use metadata::{
  AnalyzedMetadata, BuildpackLayerMetadata, BuildpackLayersMetadata, CacheMetadata, ImageIdentifier, LayerMetadata,
  LayersMetadata, MetadataError, StoreToml,
};

use std::fmt;

use crate::api::{PLATFORM_APIS, TierTable, Version};

/// Broad classification of an error, independent of which phase raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The buildpack executable could not run or exited non-zero.
  Buildpack,
  /// A buildpack produced output that breaks the contract for its API.
  ContractViolation,
  /// A file or label could not be decoded or encoded.
  Format,
  /// Filesystem or stream failure.
  Io,
}

/// Failures a lifecycle phase reports through its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
  Failed,
  InvalidArgs,
  IncompatiblePlatformApi,
  IncompatibleBuildpackApi,
  AnalyzeError,
  RestoreError,
  /// A buildpack failed its build.
  FailedBuild,
  /// The lifecycle failed during the build phase.
  BuildError,
}

impl ExitCategory {
  /// The build-phase category for an error of `kind`.
  pub fn for_build(kind: ErrorKind) -> Self {
    match kind {
      ErrorKind::Buildpack => ExitCategory::FailedBuild,
      _ => ExitCategory::BuildError,
    }
  }
}

/// Exit codes of one platform API tier.
#[derive(Debug)]
struct ExitCodes {
  failed: i32,
  invalid_args: i32,
  incompatible_platform_api: i32,
  incompatible_buildpack_api: i32,
  analyze: i32,
  restore: i32,
  failed_build: i32,
  build: i32,
}

static EXIT_CODES: TierTable<ExitCodes> = TierTable::new(&[
  (
    Version::new(0, 0),
    ExitCodes {
      failed: 1,
      invalid_args: 3,
      incompatible_platform_api: 11,
      incompatible_buildpack_api: 12,
      analyze: 202,
      restore: 302,
      failed_build: 401,
      build: 402,
    },
  ),
  (
    Version::new(0, 6),
    ExitCodes {
      failed: 1,
      invalid_args: 3,
      incompatible_platform_api: 11,
      incompatible_buildpack_api: 12,
      analyze: 30,
      restore: 40,
      failed_build: 51,
      build: 52,
    },
  ),
]);

/// The platform API a lifecycle invocation was asked to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
  api: Version,
}

impl Platform {
  pub fn new(api: Version) -> Self {
    Self { api }
  }

  pub fn api(&self) -> Version {
    self.api
  }

  pub fn is_supported(&self) -> bool {
    PLATFORM_APIS.is_supported(&self.api)
  }

  /// Exit code for a failure of `category`.
  pub fn code_for(&self, category: ExitCategory) -> i32 {
    let Some(codes) = EXIT_CODES.select(&self.api) else {
      return 1;
    };
    match category {
      ExitCategory::Failed => codes.failed,
      ExitCategory::InvalidArgs => codes.invalid_args,
      ExitCategory::IncompatiblePlatformApi => codes.incompatible_platform_api,
      ExitCategory::IncompatibleBuildpackApi => codes.incompatible_buildpack_api,
      ExitCategory::AnalyzeError => codes.analyze,
      ExitCategory::RestoreError => codes.restore,
      ExitCategory::FailedBuild => codes.failed_build,
      ExitCategory::BuildError => codes.build,
    }
  }

  /// Whether analyze still restores layer metadata (platform API < 0.7).
  pub fn analyzer_restores_layer_metadata(&self) -> bool {
    self.api.less_than(&Version::new(0, 7))
  }

  /// Whether restore reads `analyzed.toml` and restores layer metadata.
  pub fn restorer_restores_layer_metadata(&self) -> bool {
    self.api.at_least(&Version::new(0, 7))
  }

  /// Whether restore restores the application SBOM layer.
  pub fn restores_app_sbom(&self) -> bool {
    self.api.at_least(&Version::new(0, 9))
  }

  /// Whether group, plan and analyzed files live under the layers dir.
  pub fn files_in_layers_dir(&self) -> bool {
    self.api.at_least(&Version::new(0, 5))
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "platform api {}", self.api)
  }
}
