//! lifecycle-lib: the buildpack lifecycle engine
//!
//! This crate runs the phases that turn an application source tree into
//! image layers through a group of buildpacks:
//! - `analyze`: records what the previous, build and run images hold
//! - `restore`: brings back layer metadata and the app SBOM before a build
//! - `build`: runs each buildpack's build executable and interprets its output
//!
//! Every step is keyed on two contract versions, the platform API and the
//! buildpack API; see [`api`] for how version-dependent behavior is selected.

pub mod analyze;
pub mod api;
pub mod build;
pub mod buildpack;
pub mod cache;
pub mod config;
pub mod consts;
pub mod decode;
pub mod env;
pub mod image;
pub mod layer;
pub mod platform;
pub mod restore;
pub mod util;
