//! Bill-of-materials entries and their version-dependent validation.
//!
//! Three policies exist, one per buildpack API tier:
//!
//! | API      | Policy         | Behavior                                            |
//! |----------|----------------|-----------------------------------------------------|
//! | < 0.5    | legacy         | top-level and metadata versions must agree; merged  |
//! | 0.5–0.6  | transitional   | top-level version forbidden                         |
//! | >= 0.7   | modern         | never fails; BOM is deprecated, result is empty     |

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::api::{TierTable, Version};

use super::descriptor::GroupBuildpack;
use super::plan::{Require, display_value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BomError {
  #[error("top level version does not match metadata version for bom entry '{name}'")]
  VersionMismatch { name: String },

  #[error(
    "bom entry '{name}' has a top level version which is not allowed. The buildpack should instead set metadata.version"
  )]
  TopLevelVersionForbidden { name: String },
}

/// The buildpack that contributed a BOM entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomBuildpack {
  pub id: String,
  #[serde(default)]
  pub version: String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub optional: bool,
}

impl BomBuildpack {
  fn is_empty(&self) -> bool {
    self.id.is_empty() && self.version.is_empty() && !self.optional
  }
}

impl From<&GroupBuildpack> for BomBuildpack {
  fn from(bp: &GroupBuildpack) -> Self {
    Self {
      id: bp.id.clone(),
      version: bp.version.clone(),
      optional: bp.optional,
    }
  }
}

/// One dependency contribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BomEntry {
  pub name: String,
  /// Deprecated in favor of `metadata.version`.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub version: String,
  #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
  pub metadata: toml::Table,
  #[serde(default, skip_serializing_if = "BomBuildpack::is_empty")]
  pub buildpack: BomBuildpack,
}

impl BomEntry {
  pub fn convert_version_to_metadata(&mut self) {
    if !self.version.is_empty() {
      let version = std::mem::take(&mut self.version);
      self.metadata.insert("version".to_string(), toml::Value::String(version));
    }
  }
}

impl From<Require> for BomEntry {
  fn from(require: Require) -> Self {
    Self {
      name: require.name,
      version: require.version,
      metadata: require.metadata,
      buildpack: BomBuildpack::default(),
    }
  }
}

/// Tag every entry with its owning buildpack.
pub fn with_buildpack(bp: &GroupBuildpack, bom: Vec<BomEntry>) -> Vec<BomEntry> {
  let owner = BomBuildpack::from(bp);
  bom
    .into_iter()
    .map(|mut entry| {
      entry.buildpack = owner.clone();
      entry
    })
    .collect()
}

/// Validates and normalizes a buildpack's BOM for one API tier.
pub trait BomPolicy: Sync {
  fn validate(&self, owner: &GroupBuildpack, bom: Vec<BomEntry>) -> Result<Vec<BomEntry>, BomError>;
}

/// Buildpack API < 0.5.
#[derive(Debug, Default)]
pub struct LegacyBomPolicy;

impl BomPolicy for LegacyBomPolicy {
  fn validate(&self, owner: &GroupBuildpack, bom: Vec<BomEntry>) -> Result<Vec<BomEntry>, BomError> {
    for entry in &bom {
      if let Some(version) = entry.metadata.get("version") {
        if !entry.version.is_empty() && entry.version != display_value(version) {
          return Err(BomError::VersionMismatch {
            name: entry.name.clone(),
          });
        }
      }
    }

    let mut bom = with_buildpack(owner, bom);
    for entry in &mut bom {
      entry.convert_version_to_metadata();
    }
    Ok(bom)
  }
}

/// Buildpack API 0.5 and 0.6.
#[derive(Debug, Default)]
pub struct TransitionalBomPolicy;

impl BomPolicy for TransitionalBomPolicy {
  fn validate(&self, owner: &GroupBuildpack, bom: Vec<BomEntry>) -> Result<Vec<BomEntry>, BomError> {
    if let Some(entry) = bom.iter().find(|e| !e.version.is_empty()) {
      return Err(BomError::TopLevelVersionForbidden {
        name: entry.name.clone(),
      });
    }
    Ok(with_buildpack(owner, bom))
  }
}

/// Buildpack API >= 0.7.
#[derive(Debug, Default)]
pub struct ModernBomPolicy;

impl BomPolicy for ModernBomPolicy {
  fn validate(&self, owner: &GroupBuildpack, bom: Vec<BomEntry>) -> Result<Vec<BomEntry>, BomError> {
    if !bom.is_empty() {
      warn!(
        buildpack = %owner,
        entries = bom.len(),
        "the top-level bill of materials is deprecated for this buildpack api version, use SBOM files instead"
      );
    }
    Ok(Vec::new())
  }
}

static BOM_POLICIES: TierTable<&'static dyn BomPolicy> = TierTable::new(&[
  (Version::new(0, 0), &LegacyBomPolicy as &dyn BomPolicy),
  (Version::new(0, 5), &TransitionalBomPolicy as &dyn BomPolicy),
  (Version::new(0, 7), &ModernBomPolicy as &dyn BomPolicy),
]);

/// Select the BOM policy for a buildpack API.
pub fn bom_policy_for(api: &Version) -> &'static dyn BomPolicy {
  // The first tier starts at 0.0, so every version resolves.
  BOM_POLICIES.select(api).copied().unwrap_or(&LegacyBomPolicy)
}
