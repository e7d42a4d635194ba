//! Running every buildpack of the resolved group in order.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::buildpack::{Descriptor, Group, ResolvedPlan};
use crate::env::BuildEnv;

use super::types::{BuildConfig, BuildError, BuildMetadata};

/// Directory under the layers dir holding the aggregated build metadata.
pub const CONFIG_DIR: &str = "config";
pub const METADATA_TOML: &str = "metadata.toml";

/// Inputs of the group build.
#[derive(Debug, Clone, Default)]
pub struct Builder {
  pub app_dir: PathBuf,
  pub layers_dir: PathBuf,
  pub platform_dir: PathBuf,
  pub buildpacks_dir: PathBuf,
  pub group: Group,
  pub plan: ResolvedPlan,
}

impl Builder {
  /// Build each buildpack of the group in order and write the aggregated
  /// metadata to `<layers>/config/metadata.toml`.
  ///
  /// Requirements met by one buildpack are not passed to later ones. A later
  /// buildpack's process replaces an earlier one of the same type.
  pub fn build(
    &self,
    env: &mut dyn BuildEnv,
    out: &mut (dyn Write + Send),
    err: &mut (dyn Write + Send),
  ) -> Result<BuildMetadata, BuildError> {
    let mut plan = self.plan.clone();
    let mut metadata = BuildMetadata::default();
    let mut processes = BTreeMap::new();

    let mut config = BuildConfig {
      app_dir: self.app_dir.clone(),
      platform_dir: self.platform_dir.clone(),
      layers_dir: self.layers_dir.clone(),
      out,
      err,
    };

    for bp in &self.group.group {
      let descriptor = Descriptor::lookup(&self.buildpacks_dir, bp)?;
      let bp_plan = plan.find(&bp.id);
      debug!(buildpack = %bp, entries = bp_plan.entries.len(), "handing plan to buildpack");

      let result = descriptor.build(bp_plan, &mut config, env)?;

      plan = plan.filter(&result.met_requires);
      metadata.bom.extend(result.bom);
      metadata.labels.extend(result.labels);
      metadata.slices.extend(result.slices);
      for process in result.processes {
        processes.insert(process.kind.clone(), process);
      }
      metadata.buildpacks.push(bp.no_api());
    }
    metadata.processes = processes.into_values().collect();

    let config_dir = self.layers_dir.join(CONFIG_DIR);
    fs::create_dir_all(&config_dir).map_err(|source| BuildError::Prepare {
      path: config_dir.clone(),
      source,
    })?;
    let path = config_dir.join(METADATA_TOML);
    fs::write(&path, toml::to_string(&metadata)?).map_err(|source| BuildError::Prepare {
      path: path.clone(),
      source,
    })?;

    info!(
      buildpacks = metadata.buildpacks.len(),
      processes = metadata.processes.len(),
      path = ?path,
      "build complete"
    );
    Ok(metadata)
  }
}
