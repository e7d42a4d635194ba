//! Layer sidecar descriptors (`<layers>/<buildpack>/<layer>.toml`).
//!
//! Two wire shapes exist:
//!
//! - buildpack API 0.2–0.5 puts `launch`, `build` and `cache` at the top level;
//! - buildpack API 0.6 and later moves them into a `[types]` table.
//!
//! Flags found in the wrong place produce a warning message. Whether that
//! message is logged or escalated to an error is the format's
//! [`DecodePolicy`]: older buildpacks are tolerated, newer ones are held to
//! the contract.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::Version;
use crate::decode::DecodePolicy;

#[derive(Debug, Error)]
pub enum LayerMetadataError {
  #[error("no layer metadata format supports buildpack api {0}")]
  UnsupportedVersion(Version),

  #[error("failed to read layer metadata {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write layer metadata {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse layer metadata {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("failed to encode layer metadata: {0}")]
  Encode(#[from] toml::ser::Error),

  #[error("{0}")]
  Malformed(String),
}

/// The decoded content of a layer sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerMetadataFile {
  pub launch: bool,
  pub build: bool,
  pub cache: bool,
  pub metadata: toml::Table,
}

impl LayerMetadataFile {
  /// A layer with no flags set contributes nothing and is excluded from export.
  pub fn is_unused(&self) -> bool {
    !self.launch && !self.build && !self.cache
  }
}

/// A decoded sidecar plus the warning its shape produced, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedLayerMetadata {
  pub file: LayerMetadataFile,
  pub warning: Option<String>,
}

/// One wire shape of the sidecar file.
pub trait LayerMetadataFormat: Sync {
  fn supports(&self, api: &Version) -> bool;

  /// What to do with a shape warning from [`LayerMetadataFormat::decode`].
  fn policy(&self) -> DecodePolicy;

  fn encode(&self, file: &LayerMetadataFile) -> Result<String, toml::ser::Error>;

  fn decode(&self, content: &str, path: &Path) -> Result<DecodedLayerMetadata, toml::de::Error>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TopLevelFlags {
  #[serde(default)]
  launch: bool,
  #[serde(default)]
  build: bool,
  #[serde(default)]
  cache: bool,
  #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
  metadata: toml::Table,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TypesTable {
  #[serde(default)]
  launch: bool,
  #[serde(default)]
  build: bool,
  #[serde(default)]
  cache: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TypesTableFlags {
  #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
  metadata: toml::Table,
  #[serde(default)]
  types: TypesTable,
}

/// Buildpack API 0.2 up to (not including) 0.6.
#[derive(Debug, Default)]
pub struct LegacyTypesFormat;

impl LayerMetadataFormat for LegacyTypesFormat {
  fn supports(&self, api: &Version) -> bool {
    api.at_least(&Version::new(0, 2)) && api.less_than(&Version::new(0, 6))
  }

  fn policy(&self) -> DecodePolicy {
    DecodePolicy::Warn
  }

  fn encode(&self, file: &LayerMetadataFile) -> Result<String, toml::ser::Error> {
    toml::to_string(&TopLevelFlags {
      launch: file.launch,
      build: file.build,
      cache: file.cache,
      metadata: file.metadata.clone(),
    })
  }

  fn decode(&self, content: &str, path: &Path) -> Result<DecodedLayerMetadata, toml::de::Error> {
    let raw: toml::Table = toml::from_str(content)?;
    let flags: TopLevelFlags = toml::from_str(content)?;

    let warning = raw.contains_key("types").then(|| {
      format!(
        "the launch, cache and build flags should be in the top level, ignoring the values set in the types table (`{}`)",
        path.display()
      )
    });

    Ok(DecodedLayerMetadata {
      file: LayerMetadataFile {
        launch: flags.launch,
        build: flags.build,
        cache: flags.cache,
        metadata: flags.metadata,
      },
      warning,
    })
  }
}

/// Buildpack API 0.6 and later.
#[derive(Debug, Default)]
pub struct TypesTableFormat;

impl LayerMetadataFormat for TypesTableFormat {
  fn supports(&self, api: &Version) -> bool {
    api.at_least(&Version::new(0, 6))
  }

  fn policy(&self) -> DecodePolicy {
    DecodePolicy::Fail
  }

  fn encode(&self, file: &LayerMetadataFile) -> Result<String, toml::ser::Error> {
    toml::to_string(&TypesTableFlags {
      metadata: file.metadata.clone(),
      types: TypesTable {
        launch: file.launch,
        build: file.build,
        cache: file.cache,
      },
    })
  }

  fn decode(&self, content: &str, path: &Path) -> Result<DecodedLayerMetadata, toml::de::Error> {
    let raw: toml::Table = toml::from_str(content)?;
    let flags: TypesTableFlags = toml::from_str(content)?;

    let misplaced = ["launch", "build", "cache"].iter().any(|k| raw.contains_key(*k));
    let warning = misplaced.then(|| {
      format!(
        "the launch, cache and build flags should be in the types table of {}",
        path.display()
      )
    });

    Ok(DecodedLayerMetadata {
      file: LayerMetadataFile {
        launch: flags.types.launch,
        build: flags.types.build,
        cache: flags.types.cache,
        metadata: flags.metadata,
      },
      warning,
    })
  }
}

static FORMATS: &[&dyn LayerMetadataFormat] = &[&LegacyTypesFormat, &TypesTableFormat];

/// The single format claiming `api`.
pub fn format_for(api: &Version) -> Result<&'static dyn LayerMetadataFormat, LayerMetadataError> {
  FORMATS
    .iter()
    .find(|format| format.supports(api))
    .copied()
    .ok_or(LayerMetadataError::UnsupportedVersion(*api))
}

/// Write `file` to `path` in the shape of buildpack API `api`.
pub fn encode_layer_metadata_file(
  file: &LayerMetadataFile,
  path: &Path,
  api: &Version,
) -> Result<(), LayerMetadataError> {
  let content = format_for(api)?.encode(file)?;
  fs::write(path, content).map_err(|source| LayerMetadataError::Write {
    path: path.to_path_buf(),
    source,
  })
}

/// Read the sidecar at `path` as written by a buildpack of API `api`.
///
/// A missing file is the first-build case and yields an empty descriptor
/// with no warning.
pub fn decode_layer_metadata_file(path: &Path, api: &Version) -> Result<DecodedLayerMetadata, LayerMetadataError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DecodedLayerMetadata::default()),
    Err(source) => {
      return Err(LayerMetadataError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  format_for(api)?
    .decode(&content, path)
    .map_err(|source| LayerMetadataError::Parse {
      path: path.to_path_buf(),
      source,
    })
}

/// Decode and resolve any shape warning with `policy`.
pub fn decode_with_policy(
  path: &Path,
  api: &Version,
  policy: DecodePolicy,
) -> Result<LayerMetadataFile, LayerMetadataError> {
  let decoded = decode_layer_metadata_file(path, api)?;
  if let Some(warning) = decoded.warning {
    policy.apply(warning).map_err(LayerMetadataError::Malformed)?;
  }
  Ok(decoded.file)
}

/// The policy the format for `api` applies to shape warnings.
pub fn decode_policy_for(api: &Version) -> Result<DecodePolicy, LayerMetadataError> {
  Ok(format_for(api)?.policy())
}
