//! Restoring the application SBOM layer of the previous image.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::image::Image;
use crate::util::hash::hash_bytes;

use super::LayerError;

/// Directory the SBOM layer's entries are rooted at inside the tarball.
const LAYERS_ROOT: &str = "layers";

pub trait SbomRestorer {
  /// Extract the layer with `digest` from `image` into the layers dir.
  fn restore_from_previous(&self, image: &dyn Image, digest: &str) -> Result<(), LayerError>;
}

#[derive(Debug, Clone)]
pub struct DefaultSbomRestorer {
  pub layers_dir: PathBuf,
}

impl DefaultSbomRestorer {
  pub fn new(layers_dir: &Path) -> Self {
    Self {
      layers_dir: layers_dir.to_path_buf(),
    }
  }

  fn unpack(&self, content: &[u8]) -> Result<(), LayerError> {
    let mut archive = tar::Archive::new(Cursor::new(content));
    let entries = archive.entries().map_err(LayerError::Unpack)?;

    for entry in entries {
      let mut entry = entry.map_err(LayerError::Unpack)?;
      let path = entry.path().map_err(LayerError::Unpack)?.into_owned();
      let Some(relative) = strip_layers_root(&path) else {
        debug!(entry = ?path, "skipping sbom entry outside layers");
        continue;
      };
      let kind = entry.header().entry_type();
      if !kind.is_file() && !kind.is_dir() {
        debug!(entry = ?path, kind = ?kind, "skipping sbom entry that is not a file or directory");
        continue;
      }

      let target = self.layers_dir.join(&relative);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| LayerError::Write {
          path: parent.to_path_buf(),
          source,
        })?;
      }
      entry.unpack(&target).map_err(LayerError::Unpack)?;
    }
    Ok(())
  }
}

impl SbomRestorer for DefaultSbomRestorer {
  fn restore_from_previous(&self, image: &dyn Image, digest: &str) -> Result<(), LayerError> {
    info!(image = %image.name(), digest = %digest, "Restoring SBOM layer from previous image");

    let mut content = Vec::new();
    image
      .get_layer(digest)?
      .read_to_end(&mut content)
      .map_err(LayerError::Unpack)?;

    let actual = hash_bytes(&content);
    if !actual.matches(digest) {
      return Err(LayerError::DigestMismatch {
        expected: digest.to_string(),
        actual: actual.digest(),
      });
    }

    self.unpack(&content)
  }
}

/// `layers/sbom/launch/x` -> `sbom/launch/x`. `None` for anything else.
fn strip_layers_root(path: &Path) -> Option<PathBuf> {
  let mut components = path
    .components()
    .filter(|c| !matches!(c, Component::RootDir | Component::CurDir));
  match components.next() {
    Some(Component::Normal(first)) if first == LAYERS_ROOT => {}
    _ => return None,
  }

  let mut relative = PathBuf::new();
  for component in components {
    match component {
      Component::Normal(part) => relative.push(part),
      _ => return None,
    }
  }
  (!relative.as_os_str().is_empty()).then_some(relative)
}
