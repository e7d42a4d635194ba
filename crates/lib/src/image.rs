//! The image collaborator.
//!
//! Registry and daemon access live outside this crate; callers hand in
//! [`Image`] implementations for the previous, build and run images.

use std::io::Read;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::cache::Cache;
use crate::decode::DecodePolicy;

#[derive(Debug, Error)]
pub enum ImageError {
  #[error("image '{0}' not found")]
  NotFound(String),

  #[error("failed to resolve identifier of image '{name}': {message}")]
  Identifier { name: String, message: String },

  #[error("failed to read label '{label}' of image '{name}': {message}")]
  Label {
    name: String,
    label: String,
    message: String,
  },

  #[error("failed to get layer '{digest}' of image '{name}': {message}")]
  Layer {
    name: String,
    digest: String,
    message: String,
  },
}

/// Read access to an image.
pub trait Image {
  fn name(&self) -> &str;

  /// Whether the image exists at all.
  fn found(&self) -> bool;

  /// Digest reference of the image.
  fn identifier(&self) -> Result<String, ImageError>;

  /// Value of label `key`, `None` when unset.
  fn label(&self, key: &str) -> Result<Option<String>, ImageError>;

  /// Uncompressed tarball of the layer with `digest`.
  fn get_layer(&self, digest: &str) -> Result<Box<dyn Read + '_>, ImageError>;
}

/// Opens images by reference.
pub trait ImageProvider {
  fn open(&self, reference: &str) -> Result<Box<dyn Image>, ImageError>;
}

/// Decode a JSON label, resolving problems with `policy`.
///
/// An unset or empty label decodes to `T::default()`.
pub fn decode_label<T: DeserializeOwned + Default>(
  image: &dyn Image,
  label: &str,
  policy: DecodePolicy,
) -> Result<T, ImageError> {
  let fail = |message: String| ImageError::Label {
    name: image.name().to_string(),
    label: label.to_string(),
    message,
  };

  let content = match image.label(label) {
    Ok(Some(content)) if !content.is_empty() => content,
    Ok(_) => return Ok(T::default()),
    Err(e) => {
      policy.apply(e.to_string()).map_err(fail)?;
      return Ok(T::default());
    }
  };

  match serde_json::from_str(&content) {
    Ok(value) => Ok(value),
    Err(e) => {
      let message = format!("failed to decode label '{}' of image '{}': {}", label, image.name(), e);
      policy.apply(message).map_err(fail)?;
      Ok(T::default())
    }
  }
}

/// An image whose layers are served from a local cache when present there.
pub struct CachingImage<C: Cache> {
  image: Box<dyn Image>,
  cache: C,
}

impl<C: Cache> CachingImage<C> {
  pub fn new(image: Box<dyn Image>, cache: C) -> Self {
    Self { image, cache }
  }
}

impl<C: Cache> Image for CachingImage<C> {
  fn name(&self) -> &str {
    self.image.name()
  }

  fn found(&self) -> bool {
    self.image.found()
  }

  fn identifier(&self) -> Result<String, ImageError> {
    self.image.identifier()
  }

  fn label(&self, key: &str) -> Result<Option<String>, ImageError> {
    self.image.label(key)
  }

  fn get_layer(&self, digest: &str) -> Result<Box<dyn Read + '_>, ImageError> {
    if self.cache.has_layer(digest) {
      debug!(digest = %digest, cache = %self.cache.name(), "serving layer from launch cache");
      let layer = self.cache.retrieve_layer(digest).map_err(|e| ImageError::Layer {
        name: self.name().to_string(),
        digest: digest.to_string(),
        message: e.to_string(),
      })?;
      return Ok(layer);
    }
    self.image.get_layer(digest)
  }
}
