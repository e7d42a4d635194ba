//! Running one buildpack's build executable and interpreting its output.
//!
//! The buildpack API selects how the outputs are read:
//!
//! - before 0.5 the buildpack reports what it met by rewriting `plan.toml`,
//!   and the plan entries double as its bill of materials;
//! - from 0.5 it lists what it did not meet in `build.toml` and reports its
//!   bill of materials in `launch.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::Version;
use crate::buildpack::layer_metadata::{decode_policy_for, decode_with_policy};
use crate::buildpack::{
  BuildToml, Descriptor, LaunchToml, LayerMetadataFile, Plan, Process, Unmet, bom_policy_for,
  escape_id, with_buildpack,
};
use crate::consts::{BUILD_TOML, ENV_BUILDPACK_DIR, IGNORE_SUFFIX, LAUNCH_TOML, LAYER_METADATA_EXT, PLAN_FILENAME};
use crate::decode::DecodePolicy;
use crate::env::{BuildEnv, default_action_for};

use super::types::{BuildConfig, BuildError, BuildResult};

const V0_2: Version = Version::new(0, 2);
const V0_5: Version = Version::new(0, 5);
const V0_6: Version = Version::new(0, 6);

impl Descriptor {
  /// Run this buildpack's `bin/build` against `plan` and collect its results.
  ///
  /// Layers marked `build = true` are added to `env` so later buildpacks in
  /// the group see them.
  pub fn build(
    &self,
    mut plan: Plan,
    config: &mut BuildConfig<'_>,
    env: &mut dyn BuildEnv,
  ) -> Result<BuildResult, BuildError> {
    let api = Version::parse(&self.api)?;
    info!(buildpack = %self, api = %api, "running build");

    if api.equal(&V0_2) {
      debug!("updating buildpack plan entries");
      for entry in &mut plan.entries {
        entry.convert_metadata_to_version();
      }
    }

    // Removed on drop, whichever way this function returns.
    let plan_dir = tempfile::Builder::new()
      .prefix(&format!("{}-", escape_id(&self.buildpack.id)))
      .tempdir()
      .map_err(BuildError::PlanDir)?;

    let (bp_layers_dir, plan_path) = prepare_paths(&self.buildpack.id, &plan, &config.layers_dir, plan_dir.path())?;

    self.run_build_cmd(&bp_layers_dir, &plan_path, config, env)?;

    let layers = self.process_layers(&bp_layers_dir, &api)?;
    self.setup_env(&layers, env, &api)?;

    self.read_output_files(&bp_layers_dir, &plan_path, &plan, &api)
  }

  fn run_build_cmd(
    &self,
    bp_layers_dir: &Path,
    plan_path: &Path,
    config: &mut BuildConfig<'_>,
    env: &dyn BuildEnv,
  ) -> Result<(), BuildError> {
    let vars = if self.buildpack.clear_env {
      env.list()
    } else {
      env.with_platform(&config.platform_dir)?
    };

    let executable = self.dir.join("bin").join("build");
    debug!(executable = ?executable, working_dir = ?config.app_dir, "spawning build");

    let mut child = Command::new(&executable)
      .arg(bp_layers_dir)
      .arg(&config.platform_dir)
      .arg(plan_path)
      .current_dir(&config.app_dir)
      .env_clear()
      .envs(vars)
      .env(ENV_BUILDPACK_DIR, &self.dir)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|source| BuildError::Spawn {
        buildpack: self.to_string(),
        source,
      })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out = &mut *config.out;
    let err = &mut *config.err;

    let (out_result, err_result) = std::thread::scope(|s| {
      let out_pump = s.spawn(move || forward(stdout, out));
      let err_pump = s.spawn(move || forward(stderr, err));
      (join_pump(out_pump.join()), join_pump(err_pump.join()))
    });

    let status = child.wait().map_err(|source| BuildError::Spawn {
      buildpack: self.to_string(),
      source,
    })?;
    out_result.map_err(BuildError::Output)?;
    err_result.map_err(BuildError::Output)?;

    if !status.success() {
      return Err(BuildError::BuildpackFailed {
        buildpack: self.to_string(),
        status: status.to_string(),
      });
    }
    Ok(())
  }

  /// Decode the sidecar of every layer directory the buildpack left behind.
  fn process_layers(&self, bp_layers_dir: &Path, api: &Version) -> Result<BTreeMap<PathBuf, LayerMetadataFile>, BuildError> {
    let policy = decode_policy_for(api)?;
    let mut layers = BTreeMap::new();

    for entry in WalkDir::new(bp_layers_dir)
      .min_depth(1)
      .max_depth(1)
      .sort_by_file_name()
    {
      let entry = entry.map_err(|source| BuildError::ListLayers {
        path: bp_layers_dir.to_path_buf(),
        source,
      })?;
      if !entry.file_type().is_dir() {
        continue;
      }

      let path = entry.into_path();
      let file = decode_with_policy(&sidecar_path(&path), api, policy)?;
      if policy == DecodePolicy::Fail && file.is_unused() {
        rename_unused_layer(&path)?;
      }
      layers.insert(path, file);
    }
    Ok(layers)
  }

  fn setup_env(
    &self,
    layers: &BTreeMap<PathBuf, LayerMetadataFile>,
    env: &mut dyn BuildEnv,
    api: &Version,
  ) -> Result<(), BuildError> {
    let action = default_action_for(api);
    for (path, file) in layers {
      if !file.build {
        continue;
      }
      debug!(layer = ?path, "adding build layer to environment");
      env.add_root_dir(path)?;
      env.add_env_dir(&path.join("env"), action)?;
      env.add_env_dir(&path.join("env.build"), action)?;
    }
    Ok(())
  }

  fn read_output_files(
    &self,
    bp_layers_dir: &Path,
    plan_path: &Path,
    plan_in: &Plan,
    api: &Version,
  ) -> Result<BuildResult, BuildError> {
    let mut result = BuildResult::default();
    let bp = self.group_buildpack();
    let policy = bom_policy_for(api);
    let launch_path = bp_layers_dir.join(LAUNCH_TOML);

    let launch: LaunchToml = if api.less_than(&V0_5) {
      // unlike build.toml and launch.toml, a missing plan is an error
      let plan_out: Plan = read_toml_file(plan_path)?.ok_or_else(|| BuildError::ReadOutput {
        path: plan_path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "buildpack plan was removed"),
      })?;
      result.bom = policy.validate(&bp, plan_out.to_bom())?;
      result.met_requires = plan_out.names();

      match read_toml_file(&launch_path)? {
        Some(launch) => launch,
        None => return Ok(result),
      }
    } else {
      let build: BuildToml = read_toml_file(&bp_layers_dir.join(BUILD_TOML))?.unwrap_or_default();
      policy.validate(&bp, build.bom)?;

      validate_unmet(&build.unmet, plan_in)?;
      result.met_requires = plan_in.filter(&build.unmet).names();

      let launch: LaunchToml = match read_toml_file(&launch_path)? {
        Some(launch) => launch,
        None => return Ok(result),
      };
      policy.validate(&bp, launch.bom.clone())?;
      result.bom = with_buildpack(&bp, launch.bom.clone());
      launch
    };

    let mut processes = launch.processes;
    if api.less_than(&V0_6) {
      override_default_for_old_buildpacks(&mut processes);
    }
    validate_no_multiple_defaults(&processes)?;

    for process in &mut processes {
      process.buildpack_id = self.buildpack.id.clone();
    }
    result.processes = processes;
    result.labels = launch.labels;
    result.slices = launch.slices;
    Ok(result)
  }
}

/// Create `<layers>/<escaped id>` and write the plan into the scratch dir.
fn prepare_paths(id: &str, plan: &Plan, layers_dir: &Path, plan_dir: &Path) -> Result<(PathBuf, PathBuf), BuildError> {
  let dir_name = escape_id(id);
  let bp_layers_dir = layers_dir.join(&dir_name);
  let bp_plan_dir = plan_dir.join(&dir_name);

  for dir in [&bp_layers_dir, &bp_plan_dir] {
    fs::create_dir_all(dir).map_err(|source| BuildError::Prepare {
      path: dir.clone(),
      source,
    })?;
  }

  let plan_path = bp_plan_dir.join(PLAN_FILENAME);
  fs::write(&plan_path, toml::to_string(plan)?).map_err(|source| BuildError::Prepare {
    path: plan_path.clone(),
    source,
  })?;
  Ok((bp_layers_dir, plan_path))
}

fn sidecar_path(layer_dir: &Path) -> PathBuf {
  let mut name = layer_dir.as_os_str().to_owned();
  name.push(".");
  name.push(LAYER_METADATA_EXT);
  PathBuf::from(name)
}

fn rename_unused_layer(layer_dir: &Path) -> Result<(), BuildError> {
  let mut target = layer_dir.as_os_str().to_owned();
  target.push(IGNORE_SUFFIX);
  debug!(layer = ?layer_dir, "excluding layer with no types set");
  fs::rename(layer_dir, &target).map_err(|source| BuildError::RenameLayer {
    path: layer_dir.to_path_buf(),
    source,
  })
}

fn override_default_for_old_buildpacks(processes: &mut [Process]) {
  let mut replaced = Vec::new();
  for process in processes.iter_mut() {
    if process.default {
      replaced.push(process.kind.clone());
    }
    process.default = false;
  }
  if !replaced.is_empty() {
    warn!(
      "Warning: default processes aren't supported in this buildpack api version. Overriding the default value to false for the following processes: [{}]",
      replaced.join(", ")
    );
  }
}

fn validate_no_multiple_defaults(processes: &[Process]) -> Result<(), BuildError> {
  if processes.iter().filter(|p| p.default).count() > 1 {
    return Err(BuildError::MultipleDefaults);
  }
  Ok(())
}

fn validate_unmet(unmet: &[Unmet], plan: &Plan) -> Result<(), BuildError> {
  for entry in unmet {
    if entry.name.is_empty() {
      return Err(BuildError::UnmetNameRequired);
    }
    if !plan.entries.iter().any(|req| req.name == entry.name) {
      return Err(BuildError::InvalidUnmet {
        name: entry.name.clone(),
      });
    }
  }
  Ok(())
}

/// `None` when the file does not exist.
fn read_toml_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, BuildError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(BuildError::ReadOutput {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  toml::from_str(&content)
    .map(Some)
    .map_err(|source| BuildError::ParseOutput {
      path: path.to_path_buf(),
      source,
    })
}

fn forward(reader: Option<impl io::Read>, writer: &mut (dyn io::Write + Send)) -> io::Result<()> {
  if let Some(mut reader) = reader {
    io::copy(&mut reader, &mut *writer)?;
  }
  writer.flush()
}

fn join_pump(joined: std::thread::Result<io::Result<()>>) -> io::Result<()> {
  joined.unwrap_or_else(|_| Err(io::Error::other("output forwarding thread panicked")))
}
