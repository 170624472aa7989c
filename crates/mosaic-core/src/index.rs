//! Approximate nearest-neighbor search over the vocabulary.
//!
//! [`WordIndex`] wraps an HNSW graph whose point identifiers ARE vocabulary
//! positions: word `n` is inserted with data id `n`, so query results need no
//! id mapping. The graph is built offline (`mosaic build-index`) and loaded
//! from its persisted form at startup; building over a million 128-d vectors
//! is far too expensive to redo per process.
//!
//! Search is approximate by design: results are the practically-nearest
//! words under L2, not a guaranteed exact ordering, and tie order is whatever
//! the underlying graph produces.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::mem::ManuallyDrop;
use std::path::Path;

use hnsw_rs::hnswio::HnswIo;
use hnsw_rs::prelude::*;

use crate::error::{Error, Result};
use crate::vocabulary::{Vocabulary, DESCRIPTOR_DIM};

/// Basename of the persisted graph files (`words.hnsw.graph`,
/// `words.hnsw.data`).
pub const GRAPH_BASENAME: &str = "words";

/// Metadata sidecar recording `(dimension, word_count)`.
const META_FILE: &str = "index_meta.bin";

/// Search breadth floor; raised to `k` when callers ask for more.
const DEFAULT_EF_SEARCH: usize = 64;

/// One query result: a visual word and its distance to the descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Positional identifier of the word.
    pub word_id: u32,
    /// L2 distance reported by the graph.
    pub distance: f32,
}

/// Graph construction parameters for the offline build.
#[derive(Debug, Clone, Copy)]
pub struct BuildParams {
    /// Maximum connections per graph node.
    pub max_connections: usize,
    /// Candidate-list width during construction.
    pub ef_construction: usize,
    /// Maximum layer count of the graph.
    pub max_layer: usize,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            max_layer: 16,
        }
    }
}

/// A read-only nearest-neighbor index over the vocabulary.
///
/// # Safety note on the `'static` lifetime
///
/// The `'static` on the inner graph is a lifetime lie when the index was
/// loaded from disk: the graph may borrow from the reload buffers held in
/// `io_holder`. This stays sound because the lie never escapes this struct,
/// and the `Drop` impl destroys the graph strictly before `io_holder`
/// releases those buffers. For indices created by [`WordIndex::build`] the
/// graph is truly owned and `'static` is accurate.
pub struct WordIndex {
    words: usize,
    inner: ManuallyDrop<Hnsw<'static, f32, DistL2>>,
    /// Keeps reload buffers alive for `inner`; `None` for built indices.
    io_holder: Option<Box<HnswIo>>,
}

// SAFETY: `WordIndex` is Send + Sync because after construction it is
// read-only.
// - Condition 1: `inner` is only ever searched; no mutation path exists once
//   the struct is built or loaded.
// - Condition 2: `io_holder` is never accessed again after `load` returns;
//   it only pins the reload buffers until drop.
unsafe impl Send for WordIndex {}
unsafe impl Sync for WordIndex {}

impl std::fmt::Debug for WordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordIndex")
            .field("words", &self.words)
            .field("loaded_from_disk", &self.io_holder.is_some())
            .finish()
    }
}

impl WordIndex {
    /// Builds a fresh graph over the vocabulary, word position as data id.
    ///
    /// This is the offline step; serving processes use [`WordIndex::load`].
    #[must_use]
    pub fn build(vocabulary: &Vocabulary, params: &BuildParams) -> Self {
        let mut hnsw = Hnsw::<f32, DistL2>::new(
            params.max_connections,
            vocabulary.len().max(1),
            params.max_layer,
            params.ef_construction,
            DistL2 {},
        );
        for (word_id, word) in vocabulary.words().enumerate() {
            hnsw.insert_slice((word, word_id));
            if (word_id + 1) % 100_000 == 0 {
                tracing::info!(inserted = word_id + 1, "index build progress");
            }
        }
        hnsw.set_searching_mode(true);

        Self {
            words: vocabulary.len(),
            inner: ManuallyDrop::new(hnsw),
            io_holder: None,
        }
    }

    /// Persists the graph and its metadata sidecar into a directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the dump or sidecar write fails.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        self.inner
            .file_dump(dir, GRAPH_BASENAME)
            .map(|_| ())
            .map_err(std::io::Error::other)?;

        let meta_file = File::create(dir.join(META_FILE))?;
        bincode::serialize_into(BufWriter::new(meta_file), &(DESCRIPTOR_DIM, self.words))
            .map_err(std::io::Error::other)?;

        Ok(())
    }

    /// Loads a persisted index and cross-checks it against the vocabulary.
    ///
    /// Row-count matching is the only consistency this core can verify: an
    /// index built from different vector values of the same shape produces
    /// meaningless results, and guarding against that is an
    /// external-integrity precondition of deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexUnreadable`] when the artifact is missing or
    /// corrupt, [`Error::IndexIncompatible`] when its dimension or entry
    /// count disagrees with the vocabulary.
    pub fn load(dir: &Path, vocabulary: &Vocabulary) -> Result<Self> {
        let unreadable = |detail: String| Error::IndexUnreadable {
            path: dir.to_path_buf(),
            detail,
        };

        let meta_file = File::open(dir.join(META_FILE)).map_err(|e| unreadable(e.to_string()))?;
        let (dimension, words): (usize, usize) =
            bincode::deserialize_from(BufReader::new(meta_file))
                .map_err(|e| unreadable(e.to_string()))?;
        if dimension != DESCRIPTOR_DIM || words != vocabulary.len() {
            return Err(Error::IndexIncompatible {
                index: words,
                dimension,
                vocabulary: vocabulary.len(),
            });
        }

        let mut reloader = Box::new(HnswIo::new(dir, GRAPH_BASENAME));
        let graph: Hnsw<'_, f32, DistL2> = reloader
            .load_hnsw()
            .map_err(|e| unreadable(e.to_string()))?;
        // SAFETY: the graph may borrow from `reloader`. Extending to 'static
        // is sound because `reloader` moves into `io_holder` below and the
        // Drop impl destroys the graph before it.
        let graph: Hnsw<'static, f32, DistL2> = unsafe { std::mem::transmute(graph) };

        let loaded = graph.get_nb_point();
        if loaded != vocabulary.len() {
            return Err(Error::IndexIncompatible {
                index: loaded,
                dimension,
                vocabulary: vocabulary.len(),
            });
        }

        tracing::info!(
            words = vocabulary.len(),
            path = %dir.display(),
            "nearest-neighbor index loaded"
        );
        Ok(Self {
            words: vocabulary.len(),
            inner: ManuallyDrop::new(graph),
            io_holder: Some(reloader),
        })
    }

    /// Returns the `k` approximately-nearest words for a descriptor, closest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DescriptorDimension`] when the descriptor does not
    /// live in the vocabulary's 128-dimensional space.
    // Reason for allow: data ids were assigned from vocabulary positions,
    // which are bounded far below 2^32.
    #[allow(clippy::cast_possible_truncation)]
    pub fn knn(&self, descriptor: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if descriptor.len() != DESCRIPTOR_DIM {
            return Err(Error::DescriptorDimension {
                expected: DESCRIPTOR_DIM,
                actual: descriptor.len(),
            });
        }

        let ef_search = DEFAULT_EF_SEARCH.max(k);
        let found = self.inner.search(descriptor, k, ef_search);
        Ok(found
            .into_iter()
            .map(|n| Neighbor {
                word_id: n.d_id as u32,
                distance: n.distance,
            })
            .collect())
    }

    /// Number of words the index was built over.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words
    }

    /// Returns `true` for an index over an empty vocabulary.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }
}

impl Drop for WordIndex {
    fn drop(&mut self) {
        // SAFETY: `inner` is dropped exactly once, here, and strictly before
        // `io_holder` releases the buffers the graph may borrow.
        unsafe { ManuallyDrop::drop(&mut self.inner) }
    }
}
