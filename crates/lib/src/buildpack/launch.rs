//! Output files written by a buildpack's build executable.

use serde::{Deserialize, Serialize};

use super::bom::BomEntry;
use super::plan::Unmet;

/// A process type the exported image can run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
  #[serde(rename = "type")]
  pub kind: String,
  pub command: String,
  #[serde(default)]
  pub args: Vec<String>,
  #[serde(default)]
  pub direct: bool,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub default: bool,
  #[serde(default, rename = "buildpack-id", skip_serializing_if = "String::is_empty")]
  pub buildpack_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
  pub key: String,
  pub value: String,
}

/// A group of application paths exported as their own layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
  #[serde(default)]
  pub paths: Vec<String>,
}

/// `launch.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchToml {
  #[serde(default)]
  pub bom: Vec<BomEntry>,
  #[serde(default)]
  pub labels: Vec<Label>,
  #[serde(default)]
  pub processes: Vec<Process>,
  #[serde(default)]
  pub slices: Vec<Slice>,
}

/// `build.toml` (buildpack API >= 0.5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildToml {
  #[serde(default)]
  pub bom: Vec<BomEntry>,
  #[serde(default)]
  pub unmet: Vec<Unmet>,
}
