//! Buildpack descriptors and the resolved buildpack group.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::BUILDPACK_TOML;

#[derive(Debug, Error)]
pub enum DescriptorError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// Identity of one buildpack in the resolved group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBuildpack {
  pub id: String,
  #[serde(default)]
  pub version: String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub optional: bool,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub api: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub homepage: String,
}

impl GroupBuildpack {
  pub fn new(id: &str, version: &str) -> Self {
    Self {
      id: id.to_string(),
      version: version.to_string(),
      ..Default::default()
    }
  }

  pub fn with_api(mut self, api: &str) -> Self {
    self.api = api.to_string();
    self
  }

  /// Drop the contract version, as recorded in exported metadata.
  pub fn no_api(&self) -> Self {
    Self {
      api: String::new(),
      ..self.clone()
    }
  }
}

impl fmt::Display for GroupBuildpack {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.id, self.version)
  }
}

/// The resolved group read from `group.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  #[serde(default)]
  pub group: Vec<GroupBuildpack>,
}

impl Group {
  pub fn read(path: &Path) -> Result<Self, DescriptorError> {
    read_toml(path)
  }
}

/// The `[buildpack]` table of `buildpack.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackInfo {
  pub id: String,
  #[serde(default)]
  pub version: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, rename = "clear-env", skip_serializing_if = "std::ops::Not::not")]
  pub clear_env: bool,
}

/// A buildpack as found on disk: its `buildpack.toml` and directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
  pub api: String,
  pub buildpack: BuildpackInfo,
  #[serde(skip)]
  pub dir: PathBuf,
}

impl Descriptor {
  /// Read `<dir>/buildpack.toml`.
  pub fn read(dir: &Path) -> Result<Self, DescriptorError> {
    let mut descriptor: Descriptor = read_toml(&dir.join(BUILDPACK_TOML))?;
    descriptor.dir = dir.to_path_buf();
    Ok(descriptor)
  }

  /// Read the descriptor of `bp` from `<buildpacks_dir>/<escaped id>/<version>`.
  pub fn lookup(buildpacks_dir: &Path, bp: &GroupBuildpack) -> Result<Self, DescriptorError> {
    Self::read(&buildpacks_dir.join(escape_id(&bp.id)).join(&bp.version))
  }

  /// The identity this descriptor contributes to build outputs.
  pub fn group_buildpack(&self) -> GroupBuildpack {
    GroupBuildpack::new(&self.buildpack.id, &self.buildpack.version)
  }
}

impl fmt::Display for Descriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.buildpack.id, self.buildpack.version)
  }
}

/// Buildpack ids may contain `/`; on disk they are flattened with `_`.
pub fn escape_id(id: &str) -> String {
  id.replace('/', "_")
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DescriptorError> {
  let content = fs::read_to_string(path).map_err(|source| DescriptorError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  toml::from_str(&content).map_err(|source| DescriptorError::Parse {
    path: path.to_path_buf(),
    source,
  })
}
