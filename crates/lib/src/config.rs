//! Lifecycle configuration resolved from the `CNB_*` environment.
//!
//! Phases only take the resolved [`LifecycleConfig`]; reading the process
//! environment happens once, in [`LifecycleConfig::from_env`].

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::api::{Version, VersionError};
use crate::platform::Platform;

pub const ENV_APP_DIR: &str = "CNB_APP_DIR";
pub const ENV_LAYERS_DIR: &str = "CNB_LAYERS_DIR";
pub const ENV_PLATFORM_DIR: &str = "CNB_PLATFORM_DIR";
pub const ENV_BUILDPACKS_DIR: &str = "CNB_BUILDPACKS_DIR";
pub const ENV_PLATFORM_API: &str = "CNB_PLATFORM_API";
pub const ENV_GROUP_PATH: &str = "CNB_GROUP_PATH";
pub const ENV_ANALYZED_PATH: &str = "CNB_ANALYZED_PATH";
pub const ENV_PLAN_PATH: &str = "CNB_PLAN_PATH";
pub const ENV_CACHE_DIR: &str = "CNB_CACHE_DIR";
pub const ENV_LAUNCH_CACHE_DIR: &str = "CNB_LAUNCH_CACHE_DIR";
pub const ENV_SKIP_LAYERS: &str = "CNB_SKIP_LAYERS";

const DEFAULT_APP_DIR: &str = "/workspace";
const DEFAULT_LAYERS_DIR: &str = "/layers";
const DEFAULT_PLATFORM_DIR: &str = "/platform";
const DEFAULT_BUILDPACKS_DIR: &str = "/cnb/buildpacks";
const DEFAULT_PLATFORM_API: Version = Version::new(0, 3);

const GROUP_TOML: &str = "group.toml";
const ANALYZED_TOML: &str = "analyzed.toml";
const PLAN_TOML: &str = "plan.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid CNB_PLATFORM_API: {0}")]
  PlatformApi(#[from] VersionError),

  #[error("invalid {var}: '{value}' is not a boolean")]
  Bool { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
  pub app_dir: PathBuf,
  pub layers_dir: PathBuf,
  pub platform_dir: PathBuf,
  pub buildpacks_dir: PathBuf,
  pub platform_api: Version,
  pub group_path: PathBuf,
  pub analyzed_path: PathBuf,
  pub plan_path: PathBuf,
  pub cache_dir: Option<PathBuf>,
  pub launch_cache_dir: Option<PathBuf>,
  pub skip_layers: bool,
}

impl Default for LifecycleConfig {
  fn default() -> Self {
    let layers_dir = PathBuf::from(DEFAULT_LAYERS_DIR);
    Self {
      app_dir: PathBuf::from(DEFAULT_APP_DIR),
      platform_dir: PathBuf::from(DEFAULT_PLATFORM_DIR),
      buildpacks_dir: PathBuf::from(DEFAULT_BUILDPACKS_DIR),
      platform_api: DEFAULT_PLATFORM_API,
      group_path: default_file_path(&DEFAULT_PLATFORM_API, &layers_dir, GROUP_TOML),
      analyzed_path: default_file_path(&DEFAULT_PLATFORM_API, &layers_dir, ANALYZED_TOML),
      plan_path: default_file_path(&DEFAULT_PLATFORM_API, &layers_dir, PLAN_TOML),
      layers_dir,
      cache_dir: None,
      launch_cache_dir: None,
      skip_layers: false,
    }
  }
}

impl LifecycleConfig {
  /// Resolve the configuration from the process environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Resolve the configuration from `lookup`, which returns a variable's value.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let path_or = |key: &str, default: &str| PathBuf::from(var(key).unwrap_or_else(|| default.to_string()));

    let platform_api = match var(ENV_PLATFORM_API) {
      Some(api) => Version::parse(&api)?,
      None => DEFAULT_PLATFORM_API,
    };
    let layers_dir = path_or(ENV_LAYERS_DIR, DEFAULT_LAYERS_DIR);
    let file_path = |key: &str, name: &str| {
      var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_file_path(&platform_api, &layers_dir, name))
    };

    let skip_layers = match var(ENV_SKIP_LAYERS) {
      Some(value) => parse_bool(ENV_SKIP_LAYERS, &value)?,
      None => false,
    };

    Ok(Self {
      app_dir: path_or(ENV_APP_DIR, DEFAULT_APP_DIR),
      platform_dir: path_or(ENV_PLATFORM_DIR, DEFAULT_PLATFORM_DIR),
      buildpacks_dir: path_or(ENV_BUILDPACKS_DIR, DEFAULT_BUILDPACKS_DIR),
      group_path: file_path(ENV_GROUP_PATH, GROUP_TOML),
      analyzed_path: file_path(ENV_ANALYZED_PATH, ANALYZED_TOML),
      plan_path: file_path(ENV_PLAN_PATH, PLAN_TOML),
      cache_dir: var(ENV_CACHE_DIR).map(PathBuf::from),
      launch_cache_dir: var(ENV_LAUNCH_CACHE_DIR).map(PathBuf::from),
      platform_api,
      layers_dir,
      skip_layers,
    })
  }

  pub fn platform(&self) -> Platform {
    Platform::new(self.platform_api)
  }
}

/// `./<name>` below platform API 0.5, `<layers>/<name>` from 0.5.
fn default_file_path(platform_api: &Version, layers_dir: &Path, name: &str) -> PathBuf {
  if Platform::new(*platform_api).files_in_layers_dir() {
    layers_dir.join(name)
  } else {
    PathBuf::from(".").join(name)
  }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
  match value.to_ascii_lowercase().as_str() {
    "1" | "t" | "true" => Ok(true),
    "0" | "f" | "false" => Ok(false),
    _ => Err(ConfigError::Bool {
      var,
      value: value.to_string(),
    }),
  }
}
