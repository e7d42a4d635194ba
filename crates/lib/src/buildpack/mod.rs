//! Buildpack contract data formats.
//!
//! Everything a buildpack reads or writes during build, with the
//! version-dependent rules for interpreting it.
//!
//! # Submodules
//!
//! - [`bom`] - BOM entries and the per-API validation policies
//! - [`descriptor`] - `buildpack.toml` and `group.toml`
//! - [`launch`] - `launch.toml` and `build.toml`
//! - [`layer_metadata`] - layer sidecar descriptors
//! - [`plan`] - detect and build plans

pub mod bom;
pub mod descriptor;
pub mod launch;
pub mod layer_metadata;
pub mod plan;

pub use bom::{BomBuildpack, BomEntry, BomError, BomPolicy, bom_policy_for, with_buildpack};
pub use descriptor::{BuildpackInfo, Descriptor, DescriptorError, Group, GroupBuildpack, escape_id};
pub use launch::{BuildToml, Label, LaunchToml, Process, Slice};
pub use layer_metadata::{LayerMetadataError, LayerMetadataFile};
pub use plan::{Plan, Provide, Require, ResolvedEntry, ResolvedPlan, Unmet};
