//! Analyze followed by restore against the same layers dir.

use std::fs;

use lifecycle_lib::analyze::Analyzer;
use lifecycle_lib::api::Version;
use lifecycle_lib::config::LifecycleConfig;
use lifecycle_lib::consts::LAYER_METADATA_LABEL;
use lifecycle_lib::layer::DefaultMetadataRestorer;
use lifecycle_lib::platform::{AnalyzedMetadata, ExitCategory};
use lifecycle_lib::restore::{RestoreError, run_restore};
use lifecycle_lib::util::hash::hash_bytes;

use super::common::{MemoryImage, MemoryRegistry, Workspace, read, tarball};

fn config(ws: &Workspace, platform: Version) -> LifecycleConfig {
  let layers_dir = ws.path("layers");
  LifecycleConfig {
    app_dir: ws.path("app"),
    platform_dir: ws.path("platform"),
    buildpacks_dir: ws.path("buildpacks"),
    group_path: layers_dir.join("group.toml"),
    analyzed_path: layers_dir.join("analyzed.toml"),
    plan_path: layers_dir.join("plan.toml"),
    layers_dir,
    platform_api: platform,
    ..Default::default()
  }
}

fn previous_image(sbom_digest: &str, sbom_layer: Vec<u8>) -> MemoryImage {
  let label = format!(
    r#"{{"sbom":{{"sha":"{}"}},"buildpacks":[{{"key":"acme/node","version":"1.0.0","store":{{"metadata":{{"runs":3}}}},"layers":{{"runtime":{{"sha":"sha256:r","launch":true,"data":{{"flavor":"lts"}}}},"tooling":{{"sha":"sha256:t","build":true}}}}}}]}}"#,
    sbom_digest
  );
  let mut image = MemoryImage {
    name: "registry.example/app".to_string(),
    ..Default::default()
  };
  image.labels.insert(LAYER_METADATA_LABEL.to_string(), label);
  image.layers.insert(sbom_digest.to_string(), sbom_layer);
  image
}

#[test]
fn restore_consumes_what_analyze_recorded() {
  let ws = Workspace::new();
  let config = config(&ws, Version::new(0, 9));
  fs::write(
    &config.group_path,
    "[[group]]\nid = \"acme/node\"\nversion = \"1.0.0\"\napi = \"0.7\"\n",
  )
  .unwrap();

  let sbom_layer = tarball(&[("layers/sbom/launch/acme_node/sbom.cdx.json", "{}")]);
  let digest = hash_bytes(&sbom_layer).digest();
  let image = previous_image(&digest, sbom_layer);

  let unused = DefaultMetadataRestorer::new(&config.layers_dir, false);
  let analyzed = Analyzer {
    platform: config.platform(),
    previous_image: Some(&image),
    build_image: None,
    run_image: None,
    buildpacks: Vec::new(),
    cache: None,
    layer_metadata_restorer: &unused,
  }
  .analyze()
  .unwrap();
  analyzed.write(&config.analyzed_path).unwrap();

  // analyze no longer touches the layers dir at this platform
  assert!(!config.layers_dir.join("acme_node").exists());

  let mut registry = MemoryRegistry::default();
  let reference = AnalyzedMetadata::read(&config.analyzed_path)
    .unwrap()
    .image
    .unwrap()
    .reference;
  registry.images.insert(reference, image);

  run_restore(&config, &registry).unwrap();

  let bp_dir = config.layers_dir.join("acme_node");
  let runtime = read(&bp_dir.join("runtime.toml"));
  assert!(runtime.contains("launch = true"), "{}", runtime);
  assert!(runtime.contains("flavor = \"lts\""), "{}", runtime);
  // build-only layers are not restored from the image
  assert!(!bp_dir.join("tooling.toml").exists());
  assert!(read(&bp_dir.join("store.toml")).contains("runs = 3"));
  assert!(config.layers_dir.join("sbom/launch/acme_node/sbom.cdx.json").is_file());
}

#[test]
fn skip_layers_restores_only_store_toml() {
  let ws = Workspace::new();
  let mut config = config(&ws, Version::new(0, 7));
  config.skip_layers = true;
  fs::write(
    &config.group_path,
    "[[group]]\nid = \"acme/node\"\nversion = \"1.0.0\"\napi = \"0.7\"\n",
  )
  .unwrap();

  let image = previous_image("sha256:unused", Vec::new());
  let unused = DefaultMetadataRestorer::new(&config.layers_dir, false);
  Analyzer {
    platform: config.platform(),
    previous_image: Some(&image),
    build_image: None,
    run_image: None,
    buildpacks: Vec::new(),
    cache: None,
    layer_metadata_restorer: &unused,
  }
  .analyze()
  .unwrap()
  .write(&config.analyzed_path)
  .unwrap();

  run_restore(&config, &MemoryRegistry::default()).unwrap();

  let bp_dir = config.layers_dir.join("acme_node");
  assert!(bp_dir.join("store.toml").is_file());
  assert!(!bp_dir.join("runtime.toml").exists());
}

#[test]
fn unsupported_buildpack_api_is_incompatible() {
  let ws = Workspace::new();
  let config = config(&ws, Version::new(0, 9));
  fs::write(
    &config.group_path,
    "[[group]]\nid = \"acme/future\"\nversion = \"1.0.0\"\napi = \"2.0\"\n",
  )
  .unwrap();

  let err = run_restore(&config, &MemoryRegistry::default()).unwrap_err();
  assert!(matches!(err, RestoreError::UnsupportedBuildpackApi { .. }));
  assert_eq!(config.platform().code_for(err.exit_category()), 12);
}

#[test]
fn missing_group_is_a_restore_error() {
  let ws = Workspace::new();
  let config = config(&ws, Version::new(0, 5));

  let err = run_restore(&config, &MemoryRegistry::default()).unwrap_err();
  assert_eq!(err.exit_category(), ExitCategory::RestoreError);
  assert_eq!(config.platform().code_for(err.exit_category()), 302);
}
