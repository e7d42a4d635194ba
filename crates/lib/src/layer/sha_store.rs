use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::consts::LAYER_SHA_EXT;

use super::LayerError;

/// Records the digest each restored layer was restored from.
///
/// Analyze (platform API < 0.7) persists digests as `<layer>.sha` files so
/// the later restore phase can compare them; restore itself keeps them in
/// memory.
#[derive(Debug, Clone, Default)]
pub struct LayerShaStore {
  use_sha_files: bool,
  shas: HashMap<(String, String), String>,
}

impl LayerShaStore {
  pub fn new(use_sha_files: bool) -> Self {
    Self {
      use_sha_files,
      shas: HashMap::new(),
    }
  }

  pub fn uses_sha_files(&self) -> bool {
    self.use_sha_files
  }

  pub(crate) fn add(&mut self, buildpack_id: &str, layer_name: &str, layer_dir: &Path, sha: &str) -> Result<(), LayerError> {
    if self.use_sha_files {
      let path = sha_path(layer_dir);
      fs::write(&path, sha).map_err(|source| LayerError::Write { path, source })?;
    }
    self
      .shas
      .insert((buildpack_id.to_string(), layer_name.to_string()), sha.to_string());
    Ok(())
  }

  /// The digest recorded for a layer during this run.
  pub fn get(&self, buildpack_id: &str, layer_name: &str) -> Option<&str> {
    self
      .shas
      .get(&(buildpack_id.to_string(), layer_name.to_string()))
      .map(String::as_str)
  }
}

pub(crate) fn sha_path(layer_dir: &Path) -> std::path::PathBuf {
  let mut name = layer_dir.as_os_str().to_owned();
  name.push(".");
  name.push(LAYER_SHA_EXT);
  name.into()
}

/// The digest stored next to `layer_dir`, if any.
pub(crate) fn read_sha_file(layer_dir: &Path) -> Option<String> {
  fs::read_to_string(sha_path(layer_dir))
    .ok()
    .map(|sha| sha.trim().to_string())
}
