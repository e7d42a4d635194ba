//! Well-known file names, environment variables and image labels.

/// Environment variable naming the buildpack's own directory during build.
pub const ENV_BUILDPACK_DIR: &str = "CNB_BUILDPACK_DIR";

/// Per-buildpack plan file name inside the scratch plan directory.
pub const PLAN_FILENAME: &str = "plan.toml";

/// Build output file (buildpack API >= 0.5).
pub const BUILD_TOML: &str = "build.toml";

/// Launch descriptor file.
pub const LAUNCH_TOML: &str = "launch.toml";

/// Per-buildpack store file restored from the previous image.
pub const STORE_TOML: &str = "store.toml";

/// Buildpack descriptor file.
pub const BUILDPACK_TOML: &str = "buildpack.toml";

/// Extension of layer sidecar descriptors (`<layer>.toml`).
pub const LAYER_METADATA_EXT: &str = "toml";

/// Extension of layer content hash files (`<layer>.sha`).
pub const LAYER_SHA_EXT: &str = "sha";

/// Suffix given to layer directories excluded from export.
pub const IGNORE_SUFFIX: &str = ".ignore";

/// Label on the previous image holding the layers metadata.
pub const LAYER_METADATA_LABEL: &str = "io.buildpacks.lifecycle.metadata";

/// Label on the build image holding its provided capabilities.
pub const PROVIDES_LABEL: &str = "io.buildpacks.provides";

/// Label holding the build metadata of an exported image.
pub const BUILD_METADATA_LABEL: &str = "io.buildpacks.build.metadata";

/// Cache metadata file inside a volume cache's committed directory.
pub const CACHE_METADATA_FILENAME: &str = "io.buildpacks.lifecycle.cache.metadata";
