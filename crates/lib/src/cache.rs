//! The layer cache collaborator.
//!
//! Only lookup is needed here: cache metadata and committed layer tarballs.
//! Writing the cache belongs to export.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::CACHE_METADATA_FILENAME;
use crate::platform::CacheMetadata;

const COMMITTED_DIR: &str = "committed";

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache directory {0} does not exist")]
  Missing(PathBuf),

  #[error("failed to prepare cache directory {path}: {source}")]
  Prepare {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read cache metadata {path}: {source}")]
  ReadMetadata {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("layer with digest '{0}' not found in cache")]
  LayerNotFound(String),

  #[error("failed to open cached layer {path}: {source}")]
  OpenLayer {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Read access to a layer cache.
pub trait Cache {
  fn name(&self) -> String;

  /// Whether anything has been committed to the cache yet.
  fn exists(&self) -> bool;

  fn retrieve_metadata(&self) -> Result<CacheMetadata, CacheError>;

  fn has_layer(&self, digest: &str) -> bool;

  /// The uncompressed tarball of the layer with `digest`.
  fn retrieve_layer(&self, digest: &str) -> Result<Box<dyn Read>, CacheError>;
}

/// A cache kept in a local directory.
#[derive(Debug, Clone)]
pub struct VolumeCache {
  dir: PathBuf,
  committed_dir: PathBuf,
}

impl VolumeCache {
  /// Open the cache at `dir`, which must already exist.
  pub fn new(dir: &Path) -> Result<Self, CacheError> {
    if !dir.is_dir() {
      return Err(CacheError::Missing(dir.to_path_buf()));
    }
    let committed_dir = dir.join(COMMITTED_DIR);
    fs::create_dir_all(&committed_dir).map_err(|source| CacheError::Prepare {
      path: committed_dir.clone(),
      source,
    })?;
    Ok(Self {
      dir: dir.to_path_buf(),
      committed_dir,
    })
  }

  fn layer_path(&self, digest: &str) -> PathBuf {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    self.committed_dir.join(format!("{}.tar", hex))
  }
}

impl Cache for VolumeCache {
  fn name(&self) -> String {
    self.dir.display().to_string()
  }

  fn exists(&self) -> bool {
    self.committed_dir.is_dir()
  }

  fn retrieve_metadata(&self) -> Result<CacheMetadata, CacheError> {
    let path = self.committed_dir.join(CACHE_METADATA_FILENAME);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheMetadata::default()),
      Err(source) => return Err(CacheError::ReadMetadata { path, source }),
    };
    match serde_json::from_str(&content) {
      Ok(metadata) => Ok(metadata),
      Err(e) => {
        debug!(path = ?path, error = %e, "unreadable cache metadata, using empty metadata");
        Ok(CacheMetadata::default())
      }
    }
  }

  fn has_layer(&self, digest: &str) -> bool {
    self.layer_path(digest).is_file()
  }

  fn retrieve_layer(&self, digest: &str) -> Result<Box<dyn Read>, CacheError> {
    let path = self.layer_path(digest);
    match File::open(&path) {
      Ok(file) => Ok(Box::new(file)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CacheError::LayerNotFound(digest.to_string())),
      Err(source) => Err(CacheError::OpenLayer { path, source }),
    }
  }
}

/// Cache metadata, or empty metadata when no usable cache was configured.
pub fn retrieve_cache_metadata(cache: Option<&dyn Cache>) -> Result<CacheMetadata, CacheError> {
  let Some(cache) = cache else {
    debug!("usable cache not provided, using empty cache metadata");
    return Ok(CacheMetadata::default());
  };

  let metadata = cache.retrieve_metadata()?;
  if !cache.exists() {
    info!(cache = %cache.name(), "Layer cache not found");
  }
  Ok(metadata)
}
