//! Shared fixtures: an on-disk lifecycle tree and an in-memory image.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use lifecycle_lib::image::{Image, ImageError, ImageProvider};
use tempfile::TempDir;

/// A scratch tree with app, platform, layers and buildpacks dirs.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    for dir in ["app", "platform", "layers", "buildpacks"] {
      fs::create_dir_all(temp.path().join(dir)).unwrap();
    }
    Self { temp }
  }

  pub fn path(&self, name: &str) -> PathBuf {
    self.temp.path().join(name)
  }

  /// Install a buildpack whose build executable runs `script` under `/bin/sh`.
  #[cfg(unix)]
  pub fn buildpack(&self, id: &str, api: &str, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    let dir = self.path("buildpacks").join(id.replace('/', "_")).join("1.0.0");
    fs::create_dir_all(dir.join("bin")).unwrap();
    fs::write(
      dir.join("buildpack.toml"),
      format!("api = \"{}\"\n[buildpack]\nid = \"{}\"\nversion = \"1.0.0\"\n", api, id),
    )
    .unwrap();
    let executable = dir.join("bin/build");
    fs::write(&executable, format!("#!/bin/sh\nset -e\n{}\n", script)).unwrap();
    fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();
  }
}

pub fn read(path: &Path) -> String {
  fs::read_to_string(path).unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e))
}

#[derive(Debug, Clone, Default)]
pub struct MemoryImage {
  pub name: String,
  pub labels: HashMap<String, String>,
  pub layers: HashMap<String, Vec<u8>>,
}

impl Image for MemoryImage {
  fn name(&self) -> &str {
    &self.name
  }

  fn found(&self) -> bool {
    true
  }

  fn identifier(&self) -> Result<String, ImageError> {
    Ok(format!("{}@sha256:feed", self.name))
  }

  fn label(&self, key: &str) -> Result<Option<String>, ImageError> {
    Ok(self.labels.get(key).cloned())
  }

  fn get_layer(&self, digest: &str) -> Result<Box<dyn Read + '_>, ImageError> {
    match self.layers.get(digest) {
      Some(content) => Ok(Box::new(Cursor::new(content.as_slice()))),
      None => Err(ImageError::Layer {
        name: self.name.clone(),
        digest: digest.to_string(),
        message: "not in image".to_string(),
      }),
    }
  }
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
  pub images: HashMap<String, MemoryImage>,
}

impl ImageProvider for MemoryRegistry {
  fn open(&self, reference: &str) -> Result<Box<dyn Image>, ImageError> {
    self
      .images
      .get(reference)
      .cloned()
      .map(|image| Box::new(image) as Box<dyn Image>)
      .ok_or_else(|| ImageError::NotFound(reference.to_string()))
  }
}

/// A tarball of `(path, content)` entries.
pub fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(Vec::new());
  for (path, content) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, content.as_bytes()).unwrap();
  }
  builder.into_inner().unwrap()
}
