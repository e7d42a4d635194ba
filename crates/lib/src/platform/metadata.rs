//! Records exchanged between phases through files and image labels.
//!
//! The same types are read from JSON labels (`io.buildpacks.lifecycle.metadata`,
//! cache metadata) and from TOML files (`analyzed.toml`), so field names are
//! shared between both encodings.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buildpack::{LayerMetadataFile, Provide};

#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to encode analyzed metadata: {0}")]
  Encode(#[from] toml::ser::Error),
}

/// A resolved image reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageIdentifier {
  pub reference: String,
  /// Capabilities advertised by a build image.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub provides: Vec<Provide>,
}

/// Output of the analyze phase, persisted as `analyzed.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image: Option<ImageIdentifier>,
  #[serde(default, rename = "build-image", skip_serializing_if = "Option::is_none")]
  pub build_image: Option<ImageIdentifier>,
  #[serde(default, rename = "run-image", skip_serializing_if = "Option::is_none")]
  pub run_image: Option<ImageIdentifier>,
  #[serde(default)]
  pub metadata: LayersMetadata,
}

impl AnalyzedMetadata {
  pub fn read(path: &Path) -> Result<Self, MetadataError> {
    let content = fs::read_to_string(path).map_err(|source| MetadataError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| MetadataError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn write(&self, path: &Path) -> Result<(), MetadataError> {
    let content = toml::to_string(self)?;
    fs::write(path, content).map_err(|source| MetadataError::Write {
      path: path.to_path_buf(),
      source,
    })
  }
}

/// Digest of a single image layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMetadata {
  #[serde(default)]
  pub sha: String,
}

/// Layers metadata of an exported image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayersMetadata {
  #[serde(default)]
  pub app: Vec<LayerMetadata>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sbom: Option<LayerMetadata>,
  #[serde(default)]
  pub buildpacks: Vec<BuildpackLayersMetadata>,
  #[serde(default)]
  pub config: LayerMetadata,
  #[serde(default)]
  pub launcher: LayerMetadata,
  #[serde(default, rename = "process-types")]
  pub process_types: LayerMetadata,
}

impl LayersMetadata {
  pub fn metadata_for_buildpack(&self, id: &str) -> BuildpackLayersMetadata {
    find_buildpack(&self.buildpacks, id)
  }
}

/// Metadata the cache keeps about the layers it holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
  #[serde(default)]
  pub buildpacks: Vec<BuildpackLayersMetadata>,
}

impl CacheMetadata {
  pub fn metadata_for_buildpack(&self, id: &str) -> BuildpackLayersMetadata {
    find_buildpack(&self.buildpacks, id)
  }
}

/// One buildpack's layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildpackLayersMetadata {
  #[serde(rename = "key")]
  pub id: String,
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub layers: BTreeMap<String, BuildpackLayerMetadata>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub store: Option<StoreToml>,
}

/// A layer as recorded in image or cache metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildpackLayerMetadata {
  #[serde(default)]
  pub sha: String,
  #[serde(default, rename = "data", alias = "metadata", skip_serializing_if = "toml::Table::is_empty")]
  pub data: toml::Table,
  #[serde(default)]
  pub build: bool,
  #[serde(default)]
  pub launch: bool,
  #[serde(default)]
  pub cache: bool,
}

impl BuildpackLayerMetadata {
  /// The sidecar content this record restores.
  pub fn layer_metadata_file(&self) -> LayerMetadataFile {
    LayerMetadataFile {
      launch: self.launch,
      build: self.build,
      cache: self.cache,
      metadata: self.data.clone(),
    }
  }
}

/// `store.toml`: data a buildpack persists across builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreToml {
  #[serde(default)]
  pub metadata: toml::Table,
}

fn find_buildpack(buildpacks: &[BuildpackLayersMetadata], id: &str) -> BuildpackLayersMetadata {
  buildpacks
    .iter()
    .find(|bp| bp.id == id)
    .cloned()
    .unwrap_or_default()
}
