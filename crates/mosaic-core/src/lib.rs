//! # Mosaic Core
//!
//! The quantization stage of a content-based image retrieval pipeline built
//! on the bag-of-visual-words model. Incoming images are decoded, checked
//! against a size policy, run through an external feature detector, and each
//! descriptor is mapped to its nearest entries in a fixed one-million-word
//! visual vocabulary. The results are written as compact binary hit records
//! that a downstream inverted-index builder consumes.
//!
//! ## Shape of the system
//!
//! - [`Vocabulary`]: the fixed reference vectors, loaded once at startup.
//! - [`WordIndex`]: approximate nearest-neighbor search over the vocabulary,
//!   loaded from an offline-built, persisted graph.
//! - [`FeatureExtractor`]: the external decode + detect capability.
//! - [`Quantizer`]: the per-request pipeline behind a shared read-only
//!   handle, with an explicit drain gate for safe teardown.
//! - [`WorkerPool`]: spreads requests across threads.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use mosaic_core::{ImageRequest, Quantizer, QuantizerConfig, WorkerPool};
//!
//! let config = QuantizerConfig::load()?;
//! let quantizer = Quantizer::load(config, Box::new(MyExtractor::new()))?;
//!
//! let pool = WorkerPool::spawn(&quantizer, 4)?;
//! let outcome = pool.submit(ImageRequest::new(42, image_bytes));
//! println!("image 42 -> {:?}", outcome.recv()?);
//!
//! pool.join();
//! quantizer.shutdown();
//! ```
//!
//! Startup is fail-fast: a vocabulary whose row count disagrees with the
//! configuration, or an index that disagrees with the vocabulary, aborts
//! [`Quantizer::load`] entirely. A wrong vocabulary would silently shift the
//! meaning of every word identifier written downstream, so correctness wins
//! over availability.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod features;
pub mod hits;
pub mod index;
pub mod pipeline;
pub mod quantize;
pub mod response;
pub mod vocabulary;
pub mod worker;

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

pub use config::QuantizerConfig;
pub use error::{Error, Result};
pub use features::{ExtractionError, FeatureExtractor, GrayImage, Keypoint};
pub use hits::{read_hits, Hit, HitFile, HIT_RECORD_BYTES};
pub use index::{BuildParams, Neighbor, WordIndex};
pub use pipeline::{ImageRequest, IngestReport};
pub use quantize::QuantizedPose;
pub use response::ResponseCode;
pub use vocabulary::{Vocabulary, DESCRIPTOR_DIM};
pub use worker::WorkerPool;

/// Loads and cross-validates the vocabulary and the persisted index.
///
/// This is the fail-fast startup path, shared by [`Quantizer::load`] and the
/// `mosaic check` tool.
///
/// # Errors
///
/// Any error from here is fatal (`Error::is_fatal` returns `true`): the
/// process must not serve requests on top of it.
pub fn load_resources(config: &QuantizerConfig) -> Result<(Vocabulary, WordIndex)> {
    config.validate()?;

    let vocabulary = Vocabulary::load(&config.vocabulary_path)?;
    if vocabulary.len() != config.vocabulary_size {
        return Err(Error::VocabularySizeMismatch {
            expected: config.vocabulary_size,
            actual: vocabulary.len(),
        });
    }

    let index = WordIndex::load(&config.index_dir, &vocabulary)?;
    Ok((vocabulary, index))
}

/// Shared read-only state plus the in-flight gate.
struct Shared {
    config: QuantizerConfig,
    extractor: Box<dyn FeatureExtractor>,
    vocabulary: Vocabulary,
    index: WordIndex,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

/// Counts a request in for the lifetime of its processing.
struct InFlightGuard<'a> {
    shared: &'a Shared,
}

impl<'a> InFlightGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        *shared.in_flight.lock() += 1;
        Self { shared }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.shared.in_flight.lock();
        *count -= 1;
        if *count == 0 {
            self.shared.drained.notify_all();
        }
    }
}

/// The quantization service: shared, read-only, explicitly drained.
///
/// Cloning is cheap (one `Arc`); clones share the vocabulary, index, and
/// in-flight accounting. The handle replaces process-global state: whoever
/// owns a `Quantizer` can reach everything a request needs, and nothing can
/// tear the shared state down while a request still references it.
#[derive(Clone)]
pub struct Quantizer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Quantizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quantizer")
            .field("words", &self.shared.vocabulary.len())
            .field("neighbors", &self.shared.config.neighbors)
            .finish_non_exhaustive()
    }
}

impl Quantizer {
    /// Runs all fatal startup checks and stands the service up.
    ///
    /// # Errors
    ///
    /// Returns the first fatal startup error; see [`load_resources`].
    pub fn load(config: QuantizerConfig, extractor: Box<dyn FeatureExtractor>) -> Result<Self> {
        let (vocabulary, index) = load_resources(&config)?;
        tracing::info!(
            words = vocabulary.len(),
            neighbors = config.neighbors,
            output_dir = %config.output_dir.display(),
            "quantizer ready"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                extractor,
                vocabulary,
                index,
                in_flight: Mutex::new(0),
                drained: Condvar::new(),
            }),
        })
    }

    /// Processes one image request to completion.
    ///
    /// Never panics and never returns an error: per-request failures are
    /// logged and mapped onto the closed [`ResponseCode`] set. Exactly one
    /// code is produced per call.
    pub fn process(&self, request: &ImageRequest) -> ResponseCode {
        let _guard = InFlightGuard::enter(&self.shared);
        match pipeline::ingest(
            request,
            self.shared.extractor.as_ref(),
            &self.shared.index,
            &self.shared.config,
        ) {
            Ok(report) => {
                tracing::info!(
                    image_id = request.image_id,
                    keypoints = report.keypoints,
                    hits = report.hits,
                    "image quantized"
                );
                ResponseCode::Ok
            }
            Err(err) => {
                tracing::warn!(
                    image_id = request.image_id,
                    error = %err,
                    "request failed"
                );
                ResponseCode::from(&err)
            }
        }
    }

    /// The configuration the service was started with.
    #[must_use]
    pub fn config(&self) -> &QuantizerConfig {
        &self.shared.config
    }

    /// The loaded vocabulary.
    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.shared.vocabulary
    }

    /// Number of requests currently being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    /// Blocks until no request is in flight.
    pub fn drain(&self) {
        let mut count = self.shared.in_flight.lock();
        while *count > 0 {
            self.shared.drained.wait(&mut count);
        }
    }

    /// Drains in-flight requests, then releases this handle.
    ///
    /// The vocabulary and index are freed once the last clone is gone; the
    /// drain guarantees no request still references them through this
    /// handle.
    pub fn shutdown(self) {
        self.drain();
    }
}
