//! The environment a buildpack's build executable runs in.
//!
//! The environment accumulates across the group: each buildpack's `build=true`
//! layers add their POSIX root directories (`bin`, `lib`, ...) to the path-like
//! variables and apply the files in their `env` and `env.build` directories.
//!
//! An env file is named `<VAR>` or `<VAR>.<action>`. Without a suffix the
//! action is implicit and depends on the buildpack API:
//!
//! | API   | Implicit action | Effect                                  |
//! |-------|-----------------|-----------------------------------------|
//! | < 0.5 | prepend-path    | `value` + path separator + existing     |
//! | >= 0.5| override        | `value` replaces existing               |

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::api::{TierTable, Version};

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

/// Layer subdirectories and the variables they extend.
const POSIX_BUILD_ROOT_DIRS: &[(&str, &[&str])] = &[
  ("bin", &["PATH"]),
  ("lib", &["LD_LIBRARY_PATH", "LIBRARY_PATH"]),
  ("include", &["CPATH"]),
  ("lib/pkgconfig", &["PKG_CONFIG_PATH"]),
];

/// Variables inherited from the lifecycle's own environment.
const BUILD_ENV_ALLOWLIST: &[&str] = &[
  "CNB_STACK_ID",
  "HOSTNAME",
  "HOME",
  "HTTPS_PROXY",
  "https_proxy",
  "HTTP_PROXY",
  "http_proxy",
  "NO_PROXY",
  "no_proxy",
];

#[derive(Debug, Error)]
pub enum EnvError {
  #[error("failed to read env dir {path}: {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read env file {path}: {source}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to resolve layer path {path}: {source}")]
  Resolve {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
  Prepend,
  /// Implicit action for buildpack API < 0.5.
  PrependPath,
  Append,
  Override,
  Default,
}

impl ActionType {
  fn from_suffix(suffix: &str) -> Option<Self> {
    match suffix {
      "prepend" => Some(ActionType::Prepend),
      "append" => Some(ActionType::Append),
      "override" => Some(ActionType::Override),
      "default" => Some(ActionType::Default),
      _ => None,
    }
  }
}

static DEFAULT_ACTIONS: TierTable<ActionType> = TierTable::new(&[
  (Version::new(0, 0), ActionType::PrependPath),
  (Version::new(0, 5), ActionType::Override),
]);

/// The implicit action for env files without a suffix.
pub fn default_action_for(api: &Version) -> ActionType {
  DEFAULT_ACTIONS
    .select(api)
    .copied()
    .unwrap_or(ActionType::PrependPath)
}

/// Environment accumulated across a group's builds.
pub trait BuildEnv {
  /// Prepend the POSIX root directories found under `base_dir`.
  fn add_root_dir(&mut self, base_dir: &Path) -> Result<(), EnvError>;

  /// Apply every env file in `env_dir`. Missing directories are ignored.
  fn add_env_dir(&mut self, env_dir: &Path, default_action: ActionType) -> Result<(), EnvError>;

  /// The accumulated environment plus `<platform_dir>/env`.
  fn with_platform(&self, platform_dir: &Path) -> Result<Vec<(String, String)>, EnvError>;

  /// The accumulated environment.
  fn list(&self) -> Vec<(String, String)>;
}

/// The standard [`BuildEnv`].
#[derive(Debug, Clone, Default)]
pub struct Env {
  vars: BTreeMap<String, String>,
}

impl Env {
  /// Start from the allowed subset of `environ`.
  ///
  /// The caller passes the lifecycle's own environment explicitly, e.g.
  /// `Env::new_build_env(std::env::vars())`.
  pub fn new_build_env(environ: impl IntoIterator<Item = (String, String)>) -> Self {
    let vars = environ
      .into_iter()
      .filter(|(key, _)| BUILD_ENV_ALLOWLIST.contains(&key.as_str()) || is_root_env(key))
      .collect();
    Self { vars }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn set(&mut self, key: &str, value: &str) {
    self.vars.insert(key.to_string(), value.to_string());
  }

  fn prepend(&mut self, key: &str, value: &str, delim: &str) {
    let joined = match self.get(key) {
      Some(existing) if !existing.is_empty() => format!("{}{}{}", value, delim, existing),
      _ => value.to_string(),
    };
    self.set(key, &joined);
  }

  fn append(&mut self, key: &str, value: &str, delim: &str) {
    let joined = match self.get(key) {
      Some(existing) if !existing.is_empty() => format!("{}{}{}", existing, delim, value),
      _ => value.to_string(),
    };
    self.set(key, &joined);
  }
}

impl BuildEnv for Env {
  fn add_root_dir(&mut self, base_dir: &Path) -> Result<(), EnvError> {
    let base_dir = std::path::absolute(base_dir).map_err(|source| EnvError::Resolve {
      path: base_dir.to_path_buf(),
      source,
    })?;

    for (dir, keys) in POSIX_BUILD_ROOT_DIRS {
      let candidate = base_dir.join(dir);
      if !candidate.is_dir() {
        continue;
      }
      let candidate = candidate.to_string_lossy().to_string();
      for key in *keys {
        self.prepend(key, &candidate, PATH_LIST_SEPARATOR);
      }
    }
    Ok(())
  }

  fn add_env_dir(&mut self, env_dir: &Path, default_action: ActionType) -> Result<(), EnvError> {
    for (file_name, value) in read_env_files(env_dir)? {
      let (name, action) = match file_name.rsplit_once('.') {
        Some((name, "delim")) => {
          debug!(name = %name, "skipping delimiter file");
          continue;
        }
        Some((name, suffix)) => match ActionType::from_suffix(suffix) {
          Some(action) => (name.to_string(), action),
          None => {
            debug!(file = %file_name, "ignoring env file with unknown action");
            continue;
          }
        },
        None => (file_name.clone(), default_action),
      };

      let delim = read_delim(env_dir, &name)?;
      match action {
        ActionType::Prepend => self.prepend(&name, &value, &delim),
        ActionType::Append => self.append(&name, &value, &delim),
        ActionType::Override => self.set(&name, &value),
        ActionType::Default => {
          if self.get(&name).is_none_or(str::is_empty) {
            self.set(&name, &value);
          }
        }
        ActionType::PrependPath => self.prepend(&name, &value, PATH_LIST_SEPARATOR),
      }
    }
    Ok(())
  }

  fn with_platform(&self, platform_dir: &Path) -> Result<Vec<(String, String)>, EnvError> {
    let mut env = self.clone();
    for (key, value) in read_env_files(&platform_dir.join("env"))? {
      if is_root_env(&key) {
        env.prepend(&key, &value, PATH_LIST_SEPARATOR);
      } else {
        env.set(&key, &value);
      }
    }
    Ok(env.list())
  }

  fn list(&self) -> Vec<(String, String)> {
    self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }
}

fn is_root_env(key: &str) -> bool {
  POSIX_BUILD_ROOT_DIRS.iter().any(|(_, keys)| keys.contains(&key))
}

/// `(file name, content)` for every regular file in `dir`, sorted by name.
fn read_env_files(dir: &Path) -> Result<Vec<(String, String)>, EnvError> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(source) => {
      return Err(EnvError::ReadDir {
        path: dir.to_path_buf(),
        source,
      });
    }
  };

  let mut files = Vec::new();
  for entry in entries {
    let entry = entry.map_err(|source| EnvError::ReadDir {
      path: dir.to_path_buf(),
      source,
    })?;
    let path = entry.path();
    // follows symlinks
    if path.is_dir() {
      continue;
    }
    let value = fs::read_to_string(&path).map_err(|source| EnvError::ReadFile {
      path: path.clone(),
      source,
    })?;
    files.push((entry.file_name().to_string_lossy().to_string(), value));
  }
  files.sort_by(|a, b| a.0.cmp(&b.0));
  Ok(files)
}

fn read_delim(env_dir: &Path, name: &str) -> Result<String, EnvError> {
  let path = env_dir.join(format!("{}.delim", name));
  match fs::read_to_string(&path) {
    Ok(delim) => Ok(delim),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
    Err(source) => Err(EnvError::ReadFile { path, source }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn env_with(vars: &[(&str, &str)]) -> Env {
    let mut env = Env::default();
    for (k, v) in vars {
      env.set(k, v);
    }
    env
  }

  fn write(dir: &Path, name: &str, content: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), content).unwrap();
  }

  #[test]
  fn new_build_env_keeps_allowlist_and_root_vars() {
    let env = Env::new_build_env(vec![
      ("HOME".to_string(), "/home/cnb".to_string()),
      ("PATH".to_string(), "/usr/bin".to_string()),
      ("SECRET".to_string(), "nope".to_string()),
    ]);
    assert_eq!(env.get("HOME"), Some("/home/cnb"));
    assert_eq!(env.get("PATH"), Some("/usr/bin"));
    assert_eq!(env.get("SECRET"), None);
  }

  #[test]
  fn default_action_depends_on_api() {
    assert_eq!(default_action_for(&Version::new(0, 4)), ActionType::PrependPath);
    assert_eq!(default_action_for(&Version::new(0, 5)), ActionType::Override);
    assert_eq!(default_action_for(&Version::new(0, 7)), ActionType::Override);
  }

  #[test]
  #[cfg(unix)]
  fn add_root_dir_prepends_existing_subdirs() {
    let temp = TempDir::new().unwrap();
    let layer = temp.path().join("layer");
    fs::create_dir_all(layer.join("bin")).unwrap();
    fs::create_dir_all(layer.join("lib/pkgconfig")).unwrap();

    let mut env = env_with(&[("PATH", "/usr/bin")]);
    env.add_root_dir(&layer).unwrap();

    assert_eq!(env.get("PATH").unwrap(), format!("{}:/usr/bin", layer.join("bin").display()));
    assert_eq!(env.get("LD_LIBRARY_PATH").unwrap(), layer.join("lib").display().to_string());
    assert_eq!(
      env.get("PKG_CONFIG_PATH").unwrap(),
      layer.join("lib/pkgconfig").display().to_string()
    );
    assert_eq!(env.get("CPATH"), None);
  }

  #[test]
  fn suffix_actions_apply() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("env");
    write(&dir, "APPENDED.append", "b");
    write(&dir, "APPENDED.delim", ",");
    write(&dir, "PREPENDED.prepend", "x");
    write(&dir, "REPLACED.override", "new");
    write(&dir, "KEPT.default", "ignored");
    write(&dir, "FILLED.default", "filled");
    write(&dir, "STRANGE.sideways", "skip");

    let mut env = env_with(&[
      ("APPENDED", "a"),
      ("PREPENDED", "y"),
      ("REPLACED", "old"),
      ("KEPT", "kept"),
    ]);
    env.add_env_dir(&dir, ActionType::Override).unwrap();

    assert_eq!(env.get("APPENDED"), Some("a,b"));
    assert_eq!(env.get("PREPENDED"), Some("xy"));
    assert_eq!(env.get("REPLACED"), Some("new"));
    assert_eq!(env.get("KEPT"), Some("kept"));
    assert_eq!(env.get("FILLED"), Some("filled"));
    assert_eq!(env.get("STRANGE"), None);
    assert_eq!(env.get("APPENDED.delim"), None);
  }

  #[test]
  fn action_is_taken_from_last_suffix() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("env");
    write(&dir, "JAVA.TOOL.OPTIONS.override", "-Xmx1g");
    write(&dir, "LIB.DIRS.append", "b");
    write(&dir, "LIB.DIRS.delim", ":");

    let mut env = env_with(&[("JAVA.TOOL.OPTIONS", "-Xmx256m"), ("LIB.DIRS", "a")]);
    env.add_env_dir(&dir, ActionType::Override).unwrap();

    assert_eq!(env.get("JAVA.TOOL.OPTIONS"), Some("-Xmx1g"));
    assert_eq!(env.get("LIB.DIRS"), Some("a:b"));
    assert_eq!(env.get("JAVA"), None);
  }

  #[test]
  #[cfg(unix)]
  fn implicit_action_is_prepend_path_for_old_buildpacks() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("env");
    write(&dir, "GEM_PATH", "/layers/gems");

    let mut old = env_with(&[("GEM_PATH", "/usr/gems")]);
    old.add_env_dir(&dir, default_action_for(&Version::new(0, 4))).unwrap();
    assert_eq!(old.get("GEM_PATH"), Some("/layers/gems:/usr/gems"));

    let mut new = env_with(&[("GEM_PATH", "/usr/gems")]);
    new.add_env_dir(&dir, default_action_for(&Version::new(0, 6))).unwrap();
    assert_eq!(new.get("GEM_PATH"), Some("/layers/gems"));
  }

  #[test]
  fn missing_env_dir_is_ignored() {
    let temp = TempDir::new().unwrap();
    let mut env = Env::default();
    env.add_env_dir(&temp.path().join("absent"), ActionType::Override).unwrap();
    assert!(env.list().is_empty());
  }

  #[test]
  #[cfg(unix)]
  fn with_platform_prepends_root_vars_and_overrides_others() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("env"), "PATH", "/platform/bin");
    write(&temp.path().join("env"), "HOME", "/platform/home");

    let env = env_with(&[("PATH", "/usr/bin"), ("HOME", "/home/cnb")]);
    let list: BTreeMap<String, String> = env.with_platform(temp.path()).unwrap().into_iter().collect();

    assert_eq!(list["PATH"], "/platform/bin:/usr/bin");
    assert_eq!(list["HOME"], "/platform/home");
    // the accumulated environment itself is untouched
    assert_eq!(env.get("PATH"), Some("/usr/bin"));
  }
}
