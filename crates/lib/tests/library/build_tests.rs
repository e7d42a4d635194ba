//! Group builds across buildpack API generations.
#![cfg(unix)]

use lifecycle_lib::api::Version;
use lifecycle_lib::build::{BuildError, BuildMetadata, Builder, CONFIG_DIR, METADATA_TOML};
use lifecycle_lib::buildpack::{Group, GroupBuildpack, Require, ResolvedEntry, ResolvedPlan};
use lifecycle_lib::env::Env;
use lifecycle_lib::platform::{ExitCategory, Platform};
use serial_test::serial;

use super::common::{Workspace, read};

fn builder(ws: &Workspace, group: &[(&str, &str)], plan: Vec<ResolvedEntry>) -> Builder {
  Builder {
    app_dir: ws.path("app"),
    layers_dir: ws.path("layers"),
    platform_dir: ws.path("platform"),
    buildpacks_dir: ws.path("buildpacks"),
    group: Group {
      group: group
        .iter()
        .map(|(id, api)| GroupBuildpack::new(id, "1.0.0").with_api(api))
        .collect(),
    },
    plan: ResolvedPlan { entries: plan },
  }
}

fn entry(providers: &[&str], name: &str) -> ResolvedEntry {
  ResolvedEntry {
    providers: providers.iter().map(|id| GroupBuildpack::new(id, "1.0.0")).collect(),
    requires: vec![Require::new(name)],
  }
}

fn env() -> Env {
  let mut env = Env::default();
  env.set("PATH", "/usr/bin:/bin");
  env
}

#[test]
#[serial]
fn mixed_api_group_aggregates_bom_and_processes() {
  let ws = Workspace::new();

  // 0.4: met requirements and BOM come back through the rewritten plan
  ws.buildpack(
    "acme/node",
    "0.4",
    r#"printf '[[entries]]\nname = "node"\nversion = "18.1"\n' > "$3"
mkdir -p "$1/runtime"
printf 'launch = true\n[metadata]\nflavor = "lts"\n' > "$1/runtime.toml"
printf '[[processes]]\ntype = "web"\ncommand = "node server.js"\n' > "$1/launch.toml""#,
  );
  // 0.7: BOM from launch.toml, unmet entries in build.toml
  ws.buildpack(
    "acme/npm",
    "0.7",
    r#"printf '[[unmet]]\nname = "yarn"\n' > "$1/build.toml"
printf '[[bom]]\nname = "npm"\n[bom.metadata]\nversion = "9.0"\n[[processes]]\ntype = "worker"\ncommand = "npm run jobs"\ndefault = true\n' > "$1/launch.toml""#,
  );

  let builder = builder(
    &ws,
    &[("acme/node", "0.4"), ("acme/npm", "0.7")],
    vec![
      entry(&["acme/node", "acme/npm"], "node"),
      entry(&["acme/npm"], "npm"),
      entry(&["acme/npm"], "yarn"),
    ],
  );

  let mut out = Vec::new();
  let mut err = Vec::new();
  let metadata = builder.build(&mut env(), &mut out, &mut err).unwrap();

  let boms: Vec<_> = metadata
    .bom
    .iter()
    .map(|e| (e.name.as_str(), e.buildpack.id.as_str()))
    .collect();
  assert_eq!(boms, vec![("node", "acme/node"), ("npm", "acme/npm")]);
  assert_eq!(
    metadata.bom[0].metadata.get("version"),
    Some(&toml::Value::String("18.1".into()))
  );
  assert!(metadata.bom[0].version.is_empty());

  let kinds: Vec<_> = metadata.processes.iter().map(|p| p.kind.as_str()).collect();
  assert_eq!(kinds, vec!["web", "worker"]);
  assert_eq!(
    metadata.buildpacks,
    vec![GroupBuildpack::new("acme/node", "1.0.0"), GroupBuildpack::new("acme/npm", "1.0.0")]
  );

  let written: BuildMetadata = toml::from_str(&read(&ws.path("layers").join(CONFIG_DIR).join(METADATA_TOML))).unwrap();
  assert_eq!(written, metadata);

  // the 0.4 sidecar was kept as written
  assert!(ws.path("layers/acme_node/runtime.toml").is_file());
}

#[test]
#[serial]
fn failing_buildpack_maps_to_failed_build_exit_code() {
  let ws = Workspace::new();
  ws.buildpack("acme/broken", "0.7", "echo 'no compiler' >&2\nexit 7");

  let builder = builder(&ws, &[("acme/broken", "0.7")], Vec::new());
  let mut out = Vec::new();
  let mut err = Vec::new();
  let failure = builder.build(&mut env(), &mut out, &mut err).unwrap_err();

  assert!(matches!(failure, BuildError::BuildpackFailed { .. }));
  assert!(String::from_utf8_lossy(&err).contains("no compiler"));

  let category = ExitCategory::for_build(failure.kind());
  assert_eq!(category, ExitCategory::FailedBuild);
  assert_eq!(Platform::new(Version::new(0, 5)).code_for(category), 401);
  assert_eq!(Platform::new(Version::new(0, 9)).code_for(category), 51);
  assert!(!ws.path("layers").join(CONFIG_DIR).exists());
}

#[test]
#[serial]
fn contract_violation_maps_to_build_error_exit_code() {
  let ws = Workspace::new();
  ws.buildpack(
    "acme/bom",
    "0.5",
    r#"printf '[[bom]]\nname = "node"\nversion = "18"\n' > "$1/launch.toml""#,
  );

  let builder = builder(&ws, &[("acme/bom", "0.5")], Vec::new());
  let mut out = Vec::new();
  let mut err = Vec::new();
  let failure = builder.build(&mut env(), &mut out, &mut err).unwrap_err();

  let category = ExitCategory::for_build(failure.kind());
  assert_eq!(category, ExitCategory::BuildError);
  assert_eq!(Platform::new(Version::new(0, 6)).code_for(category), 52);
}
