//! Startup configuration for the quantization stage.
//!
//! Sources are merged lowest-to-highest: compiled defaults, a TOML file,
//! then environment variables prefixed with `MOSAIC_`. Everything here is
//! fixed at process startup; nothing is mutable per request.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Expected number of words in the production vocabulary.
pub const DEFAULT_VOCABULARY_SIZE: usize = 1_000_000;

/// Smallest accepted image width/height, in pixels.
pub const DEFAULT_MIN_IMAGE_DIMENSION: u32 = 200;

/// Largest accepted image width/height, in pixels.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1000;

/// Number of nearest words recorded per descriptor.
pub const DEFAULT_NEIGHBORS: usize = 4;

/// Configuration for [`Quantizer`](crate::Quantizer) startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    /// Path of the binary visual-words file.
    pub vocabulary_path: PathBuf,
    /// Directory holding the persisted nearest-neighbor index.
    pub index_dir: PathBuf,
    /// Expected vocabulary row count; a mismatch is fatal at startup.
    pub vocabulary_size: usize,
    /// Images with width or height below this bound are rejected.
    pub min_image_dimension: u32,
    /// Images with width or height above this bound are rejected.
    pub max_image_dimension: u32,
    /// Nearest words recorded per descriptor.
    pub neighbors: usize,
    /// Directory receiving per-image hit files. Must already exist; creating
    /// it is a deployment concern, not this process's.
    pub output_dir: PathBuf,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            vocabulary_path: PathBuf::from("visual_words.dat"),
            index_dir: PathBuf::from("index"),
            vocabulary_size: DEFAULT_VOCABULARY_SIZE,
            min_image_dimension: DEFAULT_MIN_IMAGE_DIMENSION,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            neighbors: DEFAULT_NEIGHBORS,
            output_dir: PathBuf::from("hits"),
        }
    }
}

impl QuantizerConfig {
    /// Loads configuration from `mosaic.toml` in the working directory
    /// (if present) and `MOSAIC_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_file("mosaic.toml")
    }

    /// Loads configuration from the given TOML file (if present) and
    /// `MOSAIC_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a source cannot be parsed and
    /// [`Error::InvalidConfig`] when the merged result is semantically
    /// invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MOSAIC_"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.vocabulary_size == 0 {
            return Err(Error::InvalidConfig(
                "vocabulary_size must be at least 1".into(),
            ));
        }
        if self.neighbors == 0 {
            return Err(Error::InvalidConfig("neighbors must be at least 1".into()));
        }
        if self.min_image_dimension > self.max_image_dimension {
            return Err(Error::InvalidConfig(format!(
                "min_image_dimension ({}) exceeds max_image_dimension ({})",
                self.min_image_dimension, self.max_image_dimension
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_production_policy() {
        let config = QuantizerConfig::default();
        assert_eq!(config.vocabulary_size, 1_000_000);
        assert_eq!(config.min_image_dimension, 200);
        assert_eq!(config.max_image_dimension, 1000);
        assert_eq!(config.neighbors, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "mosaic.toml",
                r#"
                    vocabulary_path = "words/prod.dat"
                    vocabulary_size = 500
                    neighbors = 2
                "#,
            )?;
            let config = QuantizerConfig::load().expect("config should load");
            assert_eq!(config.vocabulary_path, PathBuf::from("words/prod.dat"));
            assert_eq!(config.vocabulary_size, 500);
            assert_eq!(config.neighbors, 2);
            // Untouched keys keep their defaults.
            assert_eq!(config.max_image_dimension, 1000);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("mosaic.toml", "neighbors = 2")?;
            jail.set_env("MOSAIC_NEIGHBORS", "8");
            jail.set_env("MOSAIC_OUTPUT_DIR", "/var/lib/mosaic/hits");
            let config = QuantizerConfig::load().expect("config should load");
            assert_eq!(config.neighbors, 8);
            assert_eq!(config.output_dir, PathBuf::from("/var/lib/mosaic/hits"));
            Ok(())
        });
    }

    #[test]
    fn zero_vocabulary_size_is_rejected() {
        let config = QuantizerConfig {
            vocabulary_size: 0,
            ..QuantizerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn inverted_size_bounds_are_rejected() {
        let config = QuantizerConfig {
            min_image_dimension: 2000,
            max_image_dimension: 1000,
            ..QuantizerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn zero_neighbors_is_rejected() {
        let config = QuantizerConfig {
            neighbors: 0,
            ..QuantizerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
