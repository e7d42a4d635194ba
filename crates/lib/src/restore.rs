//! The restore phase.
//!
//! Runs before build. From platform API 0.7 restore owns layer metadata
//! restoration, reading `analyzed.toml` exactly as analyze persisted it.
//! From 0.9 it also brings back the application SBOM layer of the previous
//! image.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{BUILDPACK_APIS, Version};
use crate::buildpack::{DescriptorError, Group, GroupBuildpack};
use crate::cache::{Cache, CacheError, VolumeCache, retrieve_cache_metadata};
use crate::config::LifecycleConfig;
use crate::image::{CachingImage, Image, ImageError, ImageProvider};
use crate::layer::{
  DefaultMetadataRestorer, DefaultSbomRestorer, LayerError, LayerMetadataRestorer, LayerShaStore, SbomRestorer,
};
use crate::platform::{AnalyzedMetadata, ExitCategory, LayersMetadata, Platform};

#[derive(Debug, Error)]
pub enum RestoreError {
  #[error("reading group: {0}")]
  Group(#[from] DescriptorError),

  #[error("buildpack {buildpack} requires unsupported buildpack api '{api}'")]
  UnsupportedBuildpackApi { buildpack: String, api: String },

  #[error("opening cache: {0}")]
  Cache(#[from] CacheError),

  #[error("opening previous image: {0}")]
  PreviousImage(#[source] ImageError),

  #[error(transparent)]
  Layer(#[from] LayerError),
}

impl RestoreError {
  pub fn exit_category(&self) -> ExitCategory {
    match self {
      RestoreError::UnsupportedBuildpackApi { .. } => ExitCategory::IncompatibleBuildpackApi,
      _ => ExitCategory::RestoreError,
    }
  }
}

/// Reject the group if any buildpack declares an API this engine cannot run.
pub fn verify_buildpack_apis(group: &Group) -> Result<(), RestoreError> {
  for bp in &group.group {
    let unsupported = || RestoreError::UnsupportedBuildpackApi {
      buildpack: bp.to_string(),
      api: bp.api.clone(),
    };
    let api = Version::parse(&bp.api).map_err(|_| unsupported())?;
    if !BUILDPACK_APIS.is_supported(&api) {
      return Err(unsupported());
    }
    if BUILDPACK_APIS.is_deprecated(&api) {
      warn!(buildpack = %bp, api = %api, "Buildpack API version is deprecated");
    }
  }
  Ok(())
}

pub struct Restorer<'a> {
  pub platform: Platform,
  pub buildpacks: Vec<GroupBuildpack>,
  /// Layers metadata from `analyzed.toml`, used as is.
  pub layers_metadata: LayersMetadata,

  // platform API >= 0.9
  pub previous_image: Option<&'a dyn Image>,

  pub layer_metadata_restorer: &'a dyn LayerMetadataRestorer,
  pub sbom_restorer: &'a dyn SbomRestorer,
}

impl Restorer<'_> {
  pub fn restore(&self, cache: Option<&dyn Cache>) -> Result<(), RestoreError> {
    if self.platform.restorer_restores_layer_metadata() {
      let cache_meta = retrieve_cache_metadata(cache)?;
      let mut sha_store = LayerShaStore::new(false);
      self
        .layer_metadata_restorer
        .restore(&self.buildpacks, &self.layers_metadata, &cache_meta, &mut sha_store)?;
    } else {
      debug!(platform = %self.platform, "layer metadata restored by analyze");
    }

    if !self.platform.restores_app_sbom() {
      return Ok(());
    }
    if let (Some(image), Some(sbom)) = (self.previous_image, self.layers_metadata.sbom.as_ref()) {
      self.sbom_restorer.restore_from_previous(image, &sbom.sha)?;
    }
    Ok(())
  }
}

/// Run the restore phase described by `config`.
pub fn run_restore(config: &LifecycleConfig, images: &dyn ImageProvider) -> Result<(), RestoreError> {
  let platform = config.platform();
  let group = Group::read(&config.group_path)?;
  verify_buildpack_apis(&group)?;

  let cache = match &config.cache_dir {
    Some(dir) => Some(VolumeCache::new(dir)?),
    None => {
      warn!("Not restoring cached layer data, no cache flag specified.");
      None
    }
  };

  let mut analyzed = AnalyzedMetadata::default();
  if platform.restorer_restores_layer_metadata() {
    match AnalyzedMetadata::read(&config.analyzed_path) {
      Ok(metadata) => analyzed = metadata,
      Err(e) => info!("Error decoding previous image metadata: {}", e),
    }
  }

  let previous_reference = analyzed
    .image
    .as_ref()
    .map(|id| id.reference.as_str())
    .filter(|reference| platform.restores_app_sbom() && !reference.is_empty());
  let previous_image = match previous_reference {
    Some(reference) => Some(open_previous_image(reference, config, images)?),
    None => None,
  };

  let layer_metadata_restorer = DefaultMetadataRestorer::new(&config.layers_dir, config.skip_layers);
  let sbom_restorer = DefaultSbomRestorer::new(&config.layers_dir);
  let restorer = Restorer {
    platform,
    buildpacks: group.group,
    layers_metadata: analyzed.metadata,
    previous_image: previous_image.as_deref(),
    layer_metadata_restorer: &layer_metadata_restorer,
    sbom_restorer: &sbom_restorer,
  };
  restorer.restore(cache.as_ref().map(|c| c as &dyn Cache))
}

fn open_previous_image(
  reference: &str,
  config: &LifecycleConfig,
  images: &dyn ImageProvider,
) -> Result<Box<dyn Image>, RestoreError> {
  debug!(image = %reference, "opening previous image");
  let image = images.open(reference).map_err(RestoreError::PreviousImage)?;
  let Some(dir) = &config.launch_cache_dir else {
    return Ok(image);
  };
  Ok(Box::new(CachingImage::new(image, VolumeCache::new(dir)?)))
}
