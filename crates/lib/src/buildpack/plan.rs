//! Build plan formats.
//!
//! Detection resolves a [`ResolvedPlan`] for the whole group. Each
//! buildpack's build step receives the slice of the resolved plan it
//! provides, as a [`Plan`] written to `plan.toml`.

use serde::{Deserialize, Serialize};

use super::bom::BomEntry;
use super::descriptor::GroupBuildpack;

/// A required dependency, as declared during detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Require {
  pub name: String,
  /// Deprecated in favor of `metadata.version`.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub version: String,
  #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
  pub metadata: toml::Table,
}

impl Require {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      ..Default::default()
    }
  }

  /// Copy `metadata.version` into the top-level version.
  pub fn convert_metadata_to_version(&mut self) {
    if let Some(version) = self.metadata.get("version") {
      self.version = display_value(version);
    }
  }
}

/// Render a metadata value the way a buildpack wrote it: strings bare,
/// everything else in its TOML form.
pub(crate) fn display_value(value: &toml::Value) -> String {
  match value {
    toml::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provide {
  pub name: String,
}

/// A plan entry a buildpack declined to satisfy (build.toml, API >= 0.5).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unmet {
  #[serde(default)]
  pub name: String,
}

/// The plan handed to a single buildpack's build executable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  #[serde(default)]
  pub entries: Vec<Require>,
}

impl Plan {
  /// Entries whose name does not appear in `unmet`.
  pub fn filter(&self, unmet: &[Unmet]) -> Plan {
    Plan {
      entries: self
        .entries
        .iter()
        .filter(|entry| !unmet.iter().any(|u| u.name == entry.name))
        .cloned()
        .collect(),
    }
  }

  pub fn to_bom(&self) -> Vec<BomEntry> {
    self.entries.iter().cloned().map(BomEntry::from).collect()
  }

  pub fn names(&self) -> Vec<String> {
    self.entries.iter().map(|e| e.name.clone()).collect()
  }
}

/// One resolved requirement and the buildpacks that provide it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
  pub providers: Vec<GroupBuildpack>,
  pub requires: Vec<Require>,
}

impl ResolvedEntry {
  fn name(&self) -> Option<&str> {
    self.requires.first().map(|r| r.name.as_str())
  }
}

/// The group-wide plan produced by detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlan {
  #[serde(default)]
  pub entries: Vec<ResolvedEntry>,
}

impl ResolvedPlan {
  /// The requirements provided by buildpack `id`, flattened into a [`Plan`].
  pub fn find(&self, id: &str) -> Plan {
    let entries = self
      .entries
      .iter()
      .filter(|entry| entry.providers.iter().any(|p| p.id == id))
      .flat_map(|entry| entry.requires.iter().cloned())
      .collect();
    Plan { entries }
  }

  /// Drop entries whose requirement was met by an earlier buildpack.
  pub fn filter(&self, met: &[String]) -> ResolvedPlan {
    let entries = self
      .entries
      .iter()
      .filter(|entry| match entry.name() {
        Some(name) => !met.iter().any(|m| m == name),
        None => true,
      })
      .cloned()
      .collect();
    ResolvedPlan { entries }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn require_with_metadata(name: &str, version: &str, metadata_version: Option<toml::Value>) -> Require {
    let mut require = Require::new(name);
    require.version = version.to_string();
    if let Some(v) = metadata_version {
      require.metadata.insert("version".to_string(), v);
    }
    require
  }

  #[test]
  fn metadata_version_moves_to_top_level() {
    let mut require = require_with_metadata("node", "", Some(toml::Value::String("18.1.0".into())));
    require.convert_metadata_to_version();
    assert_eq!(require.version, "18.1.0");
  }

  #[test]
  fn non_string_metadata_version_is_rendered() {
    let mut require = require_with_metadata("jdk", "", Some(toml::Value::Integer(17)));
    require.convert_metadata_to_version();
    assert_eq!(require.version, "17");
  }

  #[test]
  fn filter_removes_unmet_entries() {
    let plan = Plan {
      entries: vec![Require::new("A"), Require::new("B")],
    };
    let filtered = plan.filter(&[Unmet { name: "B".into() }]);
    assert_eq!(filtered.names(), vec!["A".to_string()]);
  }

  #[test]
  fn plan_toml_uses_entries_tables() {
    let plan = Plan {
      entries: vec![require_with_metadata("node", "", Some(toml::Value::String("18".into())))],
    };
    let text = toml::to_string(&plan).unwrap();
    assert!(text.contains("[[entries]]"));
    let parsed: Plan = toml::from_str(&text).unwrap();
    assert_eq!(parsed, plan);
  }

  #[test]
  fn resolved_plan_find_and_filter() {
    let bp_a = GroupBuildpack::new("A", "1.0");
    let bp_b = GroupBuildpack::new("B", "1.0");
    let resolved = ResolvedPlan {
      entries: vec![
        ResolvedEntry {
          providers: vec![bp_a.clone()],
          requires: vec![Require::new("dep-1")],
        },
        ResolvedEntry {
          providers: vec![bp_a, bp_b],
          requires: vec![Require::new("dep-2")],
        },
      ],
    };

    assert_eq!(resolved.find("A").names(), vec!["dep-1", "dep-2"]);
    assert_eq!(resolved.find("B").names(), vec!["dep-2"]);

    let remaining = resolved.filter(&["dep-2".to_string()]);
    assert_eq!(remaining.find("B").entries.len(), 0);
    assert_eq!(remaining.find("A").names(), vec!["dep-1"]);
  }
}
