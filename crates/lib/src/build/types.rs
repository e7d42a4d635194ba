//! Types shared by the build executor and the group builder.

use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::VersionError;
use crate::buildpack::{
  BomEntry, BomError, DescriptorError, GroupBuildpack, Label, LayerMetadataError, Process, Slice,
};
use crate::env::EnvError;
use crate::platform::ErrorKind;

/// Paths and output streams for one buildpack build.
pub struct BuildConfig<'a> {
  pub app_dir: PathBuf,
  pub platform_dir: PathBuf,
  pub layers_dir: PathBuf,
  /// Receives the build executable's stdout.
  pub out: &'a mut (dyn Write + Send),
  /// Receives the build executable's stderr.
  pub err: &'a mut (dyn Write + Send),
}

/// What one buildpack contributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildResult {
  pub bom: Vec<BomEntry>,
  pub labels: Vec<Label>,
  /// Names of the plan entries the buildpack satisfied.
  pub met_requires: Vec<String>,
  pub processes: Vec<Process>,
  pub slices: Vec<Slice>,
}

/// Aggregated output of a whole group, written to `<layers>/config/metadata.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildMetadata {
  #[serde(default)]
  pub bom: Vec<BomEntry>,
  #[serde(default)]
  pub buildpacks: Vec<GroupBuildpack>,
  #[serde(default)]
  pub labels: Vec<Label>,
  #[serde(default)]
  pub processes: Vec<Process>,
  #[serde(default)]
  pub slices: Vec<Slice>,
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("invalid buildpack api: {0}")]
  Api(#[from] VersionError),

  #[error("failed to create plan directory: {0}")]
  PlanDir(#[source] io::Error),

  #[error("failed to prepare {path}: {source}")]
  Prepare {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to encode toml: {0}")]
  Encode(#[from] toml::ser::Error),

  #[error("failed to run build for buildpack {buildpack}: {source}")]
  Spawn {
    buildpack: String,
    #[source]
    source: io::Error,
  },

  #[error("build for buildpack {buildpack} exited with {status}")]
  BuildpackFailed { buildpack: String, status: String },

  #[error("failed to forward build output: {0}")]
  Output(#[source] io::Error),

  #[error("env: {0}")]
  Env(#[from] EnvError),

  #[error("layer metadata: {0}")]
  LayerMetadata(#[from] LayerMetadataError),

  #[error("failed to list layers in {path}: {source}")]
  ListLayers {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to rename layer {path}: {source}")]
  RenameLayer {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  ReadOutput {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  ParseOutput {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error(transparent)]
  Bom(#[from] BomError),

  #[error("unmet.name is required")]
  UnmetNameRequired,

  #[error("unmet.name '{name}' must match a requested dependency")]
  InvalidUnmet { name: String },

  #[error("multiple default process types aren't allowed")]
  MultipleDefaults,

  #[error(transparent)]
  Descriptor(#[from] DescriptorError),
}

impl BuildError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      BuildError::Spawn { .. } | BuildError::BuildpackFailed { .. } => ErrorKind::Buildpack,
      BuildError::Bom(_)
      | BuildError::UnmetNameRequired
      | BuildError::InvalidUnmet { .. }
      | BuildError::MultipleDefaults
      | BuildError::LayerMetadata(LayerMetadataError::Malformed(_)) => ErrorKind::ContractViolation,
      BuildError::LayerMetadata(LayerMetadataError::Read { .. } | LayerMetadataError::Write { .. }) => ErrorKind::Io,
      BuildError::Api(_)
      | BuildError::Encode(_)
      | BuildError::ParseOutput { .. }
      | BuildError::Descriptor(DescriptorError::Parse { .. })
      | BuildError::LayerMetadata(_) => ErrorKind::Format,
      BuildError::PlanDir(_)
      | BuildError::Prepare { .. }
      | BuildError::Output(_)
      | BuildError::Env(_)
      | BuildError::ListLayers { .. }
      | BuildError::RenameLayer { .. }
      | BuildError::ReadOutput { .. }
      | BuildError::Descriptor(_) => ErrorKind::Io,
    }
  }
}
