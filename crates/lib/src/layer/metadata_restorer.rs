//! Reconciling the layers directory with previous-image and cache metadata.
//!
//! Before a build, each buildpack's layers directory gets back the sidecar
//! descriptors of the layers it produced last time, so the buildpack can
//! decide whether to reuse them. Launch layers come from the previous image;
//! cache-only layers come from the cache.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::api::Version;
use crate::buildpack::layer_metadata::encode_layer_metadata_file;
use crate::buildpack::{GroupBuildpack, escape_id};
use crate::consts::{LAYER_METADATA_EXT, STORE_TOML};
use crate::platform::{BuildpackLayerMetadata, CacheMetadata, LayersMetadata};

use super::LayerError;
use super::sha_store::{LayerShaStore, read_sha_file};

/// Restores layer metadata ahead of a build.
pub trait LayerMetadataRestorer {
  fn restore(
    &self,
    buildpacks: &[GroupBuildpack],
    app_meta: &LayersMetadata,
    cache_meta: &CacheMetadata,
    sha_store: &mut LayerShaStore,
  ) -> Result<(), LayerError>;
}

/// Writes `store.toml` and layer sidecars into `<layers>/<escaped id>/`.
#[derive(Debug, Clone)]
pub struct DefaultMetadataRestorer {
  pub layers_dir: PathBuf,
  /// Restore only `store.toml`.
  pub skip_layers: bool,
}

impl DefaultMetadataRestorer {
  pub fn new(layers_dir: &Path, skip_layers: bool) -> Self {
    Self {
      layers_dir: layers_dir.to_path_buf(),
      skip_layers,
    }
  }

  fn restore_store_toml(&self, buildpacks: &[GroupBuildpack], app_meta: &LayersMetadata) -> Result<(), LayerError> {
    for bp in buildpacks {
      let Some(store) = app_meta.metadata_for_buildpack(&bp.id).store else {
        continue;
      };
      let dir = self.layers_dir.join(escape_id(&bp.id));
      create_dir(&dir)?;
      let path = dir.join(STORE_TOML);
      debug!(buildpack = %bp, path = ?path, "restoring store.toml");
      fs::write(&path, toml::to_string(&store)?).map_err(|source| LayerError::Write { path, source })?;
    }
    Ok(())
  }

  fn restore_layer_metadata(
    &self,
    buildpacks: &[GroupBuildpack],
    app_meta: &LayersMetadata,
    cache_meta: &CacheMetadata,
    sha_store: &mut LayerShaStore,
  ) -> Result<(), LayerError> {
    if self.skip_layers {
      info!("Skipping buildpack layer analysis");
      return Ok(());
    }

    for bp in buildpacks {
      let api = Version::parse(&bp.api).map_err(|source| LayerError::Api {
        buildpack: bp.to_string(),
        source,
      })?;
      let bp_dir = self.layers_dir.join(escape_id(&bp.id));

      for (name, layer) in &app_meta.metadata_for_buildpack(&bp.id).layers {
        let identifier = format!("{}:{}", bp.id, name);
        if !layer.launch {
          debug!(layer = %identifier, "not restoring metadata, marked as launch=false");
          continue;
        }
        if layer.build && !layer.cache {
          debug!(layer = %identifier, "not restoring metadata, marked as build=true, cache=false");
          continue;
        }
        info!(layer = %identifier, "Restoring metadata from app image");
        write_layer_metadata(sha_store, &bp_dir, &bp.id, name, layer, &api)?;
      }

      for (name, layer) in &cache_meta.metadata_for_buildpack(&bp.id).layers {
        let identifier = format!("{}:{}", bp.id, name);
        if !layer.cache {
          debug!(layer = %identifier, "not restoring from cache, marked as cache=false");
          continue;
        }
        // restored from the app image above, or stale
        if layer.launch {
          debug!(layer = %identifier, "not restoring from cache, marked as launch=true");
          continue;
        }
        info!(layer = %identifier, "Restoring metadata from cache");
        write_layer_metadata(sha_store, &bp_dir, &bp.id, name, layer, &api)?;
      }
    }
    Ok(())
  }
}

impl LayerMetadataRestorer for DefaultMetadataRestorer {
  fn restore(
    &self,
    buildpacks: &[GroupBuildpack],
    app_meta: &LayersMetadata,
    cache_meta: &CacheMetadata,
    sha_store: &mut LayerShaStore,
  ) -> Result<(), LayerError> {
    self.restore_store_toml(buildpacks, app_meta)?;
    self.restore_layer_metadata(buildpacks, app_meta, cache_meta, sha_store)
  }
}

fn write_layer_metadata(
  sha_store: &mut LayerShaStore,
  bp_dir: &Path,
  buildpack_id: &str,
  name: &str,
  layer: &BuildpackLayerMetadata,
  api: &Version,
) -> Result<(), LayerError> {
  let layer_dir = bp_dir.join(name);
  if sha_store.uses_sha_files() && read_sha_file(&layer_dir).as_deref() == Some(layer.sha.as_str()) {
    debug!(layer = ?layer_dir, sha = %layer.sha, "layer already restored");
    return sha_store.add(buildpack_id, name, &layer_dir, &layer.sha);
  }

  create_dir(bp_dir)?;
  let sidecar = bp_dir.join(format!("{}.{}", name, LAYER_METADATA_EXT));
  debug!(path = ?sidecar, "writing layer metadata");
  encode_layer_metadata_file(&layer.layer_metadata_file(), &sidecar, api)?;
  sha_store.add(buildpack_id, name, &layer_dir, &layer.sha)
}

fn create_dir(dir: &Path) -> Result<(), LayerError> {
  fs::create_dir_all(dir).map_err(|source| LayerError::Write {
    path: dir.to_path_buf(),
    source,
  })
}
