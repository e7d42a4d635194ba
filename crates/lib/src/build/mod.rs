//! The build phase.
//!
//! [`Descriptor::build`](crate::buildpack::Descriptor::build) runs a single
//! buildpack; [`Builder`] runs the whole group, threading the plan and the
//! build environment from one buildpack to the next.

mod builder;
mod execute;
mod types;

pub use builder::{Builder, CONFIG_DIR, METADATA_TOML};
pub use types::{BuildConfig, BuildError, BuildMetadata, BuildResult};
