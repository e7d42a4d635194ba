//! Layer reconciliation ahead of a build.

mod metadata_restorer;
mod sbom;
mod sha_store;

pub use metadata_restorer::{DefaultMetadataRestorer, LayerMetadataRestorer};
pub use sbom::{DefaultSbomRestorer, SbomRestorer};
pub use sha_store::LayerShaStore;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::VersionError;
use crate::buildpack::LayerMetadataError;
use crate::image::ImageError;

#[derive(Debug, Error)]
pub enum LayerError {
  #[error("invalid api of buildpack {buildpack}: {source}")]
  Api {
    buildpack: String,
    #[source]
    source: VersionError,
  },

  #[error("layer metadata: {0}")]
  Metadata(#[from] LayerMetadataError),

  #[error("failed to encode store.toml: {0}")]
  EncodeStore(#[from] toml::ser::Error),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Image(#[from] ImageError),

  #[error("layer digest mismatch: expected {expected}, got {actual}")]
  DigestMismatch { expected: String, actual: String },

  #[error("failed to unpack layer: {0}")]
  Unpack(#[source] io::Error),
}
