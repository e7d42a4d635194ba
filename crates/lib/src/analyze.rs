//! The analyze phase.
//!
//! Collects what is known about the images involved in the build into an
//! [`AnalyzedMetadata`] record. For platform API < 0.7 analyze also restores
//! layer metadata, which later platforms moved to the restore phase.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::buildpack::{GroupBuildpack, Provide};
use crate::cache::{Cache, CacheError, retrieve_cache_metadata};
use crate::consts::{LAYER_METADATA_LABEL, PROVIDES_LABEL};
use crate::decode::DecodePolicy;
use crate::image::{Image, ImageError, decode_label};
use crate::layer::{LayerError, LayerMetadataRestorer, LayerShaStore};
use crate::platform::{AnalyzedMetadata, ImageIdentifier, LayersMetadata, Platform};

#[derive(Debug, Error)]
pub enum AnalyzeError {
  #[error("retrieving image identifier: {0}")]
  Identifier(#[source] ImageError),

  #[error("retrieving cache metadata: {0}")]
  CacheMetadata(#[from] CacheError),

  #[error("restoring layer metadata: {0}")]
  Restore(#[from] LayerError),
}

#[derive(Debug, Default, Deserialize)]
struct BuildImageProvides {
  #[serde(default)]
  provides: Vec<Provide>,
}

pub struct Analyzer<'a> {
  pub platform: Platform,
  pub previous_image: Option<&'a dyn Image>,
  pub build_image: Option<&'a dyn Image>,
  pub run_image: Option<&'a dyn Image>,

  // platform API < 0.7
  pub buildpacks: Vec<GroupBuildpack>,
  pub cache: Option<&'a dyn Cache>,
  pub layer_metadata_restorer: &'a dyn LayerMetadataRestorer,
}

impl Analyzer<'_> {
  pub fn analyze(&self) -> Result<AnalyzedMetadata, AnalyzeError> {
    let mut build_image_id = None;
    if let Some(image) = self.build_image {
      debug!(image = %image.name(), "processing build image");
      build_image_id = image_identifier(image)?;
      if let Some(id) = build_image_id.as_mut() {
        let provides: BuildImageProvides = decode_label(image, PROVIDES_LABEL, DecodePolicy::Ignore).unwrap_or_default();
        id.provides = provides.provides;
      }
    }

    let mut previous_image_id = None;
    let mut app_meta = LayersMetadata::default();
    if let Some(image) = self.previous_image {
      previous_image_id = image_identifier(image)?;
      app_meta = decode_label(image, LAYER_METADATA_LABEL, DecodePolicy::Ignore).unwrap_or_default();
    }

    let run_image_id = match self.run_image {
      Some(image) => image_identifier(image)?,
      None => None,
    };

    if self.platform.analyzer_restores_layer_metadata() {
      let cache_meta = retrieve_cache_metadata(self.cache)?;
      let mut sha_store = LayerShaStore::new(true);
      self
        .layer_metadata_restorer
        .restore(&self.buildpacks, &app_meta, &cache_meta, &mut sha_store)?;
    }

    Ok(AnalyzedMetadata {
      image: previous_image_id,
      build_image: build_image_id,
      run_image: run_image_id,
      metadata: app_meta,
    })
  }
}

fn image_identifier(image: &dyn Image) -> Result<Option<ImageIdentifier>, AnalyzeError> {
  if !image.found() {
    info!("Previous image with name \"{}\" not found", image.name());
    return Ok(None);
  }
  let reference = image.identifier().map_err(AnalyzeError::Identifier)?;
  debug!(image = %reference, "analyzing image");
  Ok(Some(ImageIdentifier {
    reference,
    provides: Vec::new(),
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Version;
  use crate::cache::VolumeCache;
  use crate::consts::CACHE_METADATA_FILENAME;
  use crate::image::testing::FakeImage;
  use crate::platform::CacheMetadata;
  use std::cell::RefCell;
  use std::fs;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  #[derive(Default)]
  struct RecordingRestorer {
    calls: RefCell<Vec<(Vec<GroupBuildpack>, LayersMetadata, CacheMetadata, bool)>>,
  }

  impl LayerMetadataRestorer for RecordingRestorer {
    fn restore(
      &self,
      buildpacks: &[GroupBuildpack],
      app_meta: &LayersMetadata,
      cache_meta: &CacheMetadata,
      sha_store: &mut LayerShaStore,
    ) -> Result<(), LayerError> {
      self.calls.borrow_mut().push((
        buildpacks.to_vec(),
        app_meta.clone(),
        cache_meta.clone(),
        sha_store.uses_sha_files(),
      ));
      Ok(())
    }
  }

  const APP_LABEL: &str = r#"{"buildpacks":[{"key":"acme/node","version":"1.0.0","layers":{"node":{"sha":"sha256:n","launch":true}}}]}"#;

  fn analyzer<'a>(platform: &str, restorer: &'a RecordingRestorer) -> Analyzer<'a> {
    Analyzer {
      platform: Platform::new(Version::parse(platform).unwrap()),
      previous_image: None,
      build_image: None,
      run_image: None,
      buildpacks: vec![GroupBuildpack::new("acme/node", "1.0.0").with_api("0.6")],
      cache: None,
      layer_metadata_restorer: restorer,
    }
  }

  #[test]
  fn reads_previous_and_build_images() {
    let restorer = RecordingRestorer::default();
    let previous = FakeImage::new("app", "app@sha256:1").with_label(LAYER_METADATA_LABEL, APP_LABEL);
    let build = FakeImage::new("build", "build@sha256:2").with_label(PROVIDES_LABEL, r#"{"provides":[{"name":"node"}]}"#);
    let run = FakeImage::new("run", "run@sha256:3");

    let analyzed = Analyzer {
      previous_image: Some(&previous),
      build_image: Some(&build),
      run_image: Some(&run),
      ..analyzer("0.7", &restorer)
    }
    .analyze()
    .unwrap();

    assert_eq!(analyzed.image.unwrap().reference, "app@sha256:1");
    let build_id = analyzed.build_image.unwrap();
    assert_eq!(build_id.reference, "build@sha256:2");
    assert_eq!(build_id.provides, vec![Provide { name: "node".into() }]);
    assert_eq!(analyzed.run_image.unwrap().reference, "run@sha256:3");
    assert_eq!(
      analyzed.metadata.metadata_for_buildpack("acme/node").layers["node"].sha,
      "sha256:n"
    );
    assert!(restorer.calls.borrow().is_empty());
  }

  #[test]
  fn undecodable_labels_are_empty() {
    let restorer = RecordingRestorer::default();
    let previous = FakeImage::new("app", "app@sha256:1").with_label(LAYER_METADATA_LABEL, "][");
    let build = FakeImage::new("build", "build@sha256:2").with_label(PROVIDES_LABEL, "nope");

    let analyzed = Analyzer {
      previous_image: Some(&previous),
      build_image: Some(&build),
      ..analyzer("0.7", &restorer)
    }
    .analyze()
    .unwrap();

    assert_eq!(analyzed.metadata, LayersMetadata::default());
    assert!(analyzed.build_image.unwrap().provides.is_empty());
    assert!(analyzed.image.is_some());
  }

  #[test]
  #[traced_test]
  fn missing_previous_image_is_none() {
    let restorer = RecordingRestorer::default();
    let previous = FakeImage::missing("registry/app");

    let analyzed = Analyzer {
      previous_image: Some(&previous),
      ..analyzer("0.7", &restorer)
    }
    .analyze()
    .unwrap();

    assert_eq!(analyzed.image, None);
    assert_eq!(analyzed.metadata, LayersMetadata::default());
    assert!(logs_contain("Previous image with name \"registry/app\" not found"));
  }

  #[test]
  fn identifier_failure_fails() {
    let restorer = RecordingRestorer::default();
    let mut build = FakeImage::new("build", "x");
    build.identifier = None;

    let err = Analyzer {
      build_image: Some(&build),
      ..analyzer("0.7", &restorer)
    }
    .analyze()
    .unwrap_err();
    assert!(matches!(err, AnalyzeError::Identifier(_)));
  }

  #[test]
  fn old_platforms_restore_layer_metadata_with_sha_files() {
    let temp = TempDir::new().unwrap();
    let cache = VolumeCache::new(temp.path()).unwrap();
    fs::write(
      temp.path().join("committed").join(CACHE_METADATA_FILENAME),
      r#"{"buildpacks":[{"key":"acme/node","layers":{"deps":{"sha":"sha256:d","cache":true}}}]}"#,
    )
    .unwrap();

    let restorer = RecordingRestorer::default();
    let previous = FakeImage::new("app", "app@sha256:1").with_label(LAYER_METADATA_LABEL, APP_LABEL);

    Analyzer {
      previous_image: Some(&previous),
      cache: Some(&cache),
      ..analyzer("0.6", &restorer)
    }
    .analyze()
    .unwrap();

    let calls = restorer.calls.borrow();
    assert_eq!(calls.len(), 1);
    let (buildpacks, app_meta, cache_meta, sha_files) = &calls[0];
    assert_eq!(buildpacks[0].id, "acme/node");
    assert_eq!(app_meta.metadata_for_buildpack("acme/node").layers.len(), 1);
    assert_eq!(cache_meta.metadata_for_buildpack("acme/node").layers["deps"].sha, "sha256:d");
    assert!(*sha_files);
  }

  #[test]
  fn old_platforms_without_cache_use_empty_cache_metadata() {
    let restorer = RecordingRestorer::default();
    analyzer("0.5", &restorer).analyze().unwrap();

    let calls = restorer.calls.borrow();
    assert_eq!(calls[0].2, CacheMetadata::default());
    assert_eq!(calls[0].1, LayersMetadata::default());
  }
}
