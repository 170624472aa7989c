//! The visual-word vocabulary: a fixed, ordered set of reference vectors.
//!
//! Word identity is purely positional. The word at row `n` of the vocabulary
//! file IS word `n` in every hit record this process emits, which is why the
//! row count is cross-checked against the configured size at startup instead
//! of being trusted.
//!
//! # File format
//!
//! A sequence of records, each 128 consecutive little-endian 32-bit floats
//! followed by a single `\n` delimiter byte. A record whose floats cannot be
//! fully read (a truncated tail) is silently dropped; it does not invalidate
//! the records already read.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};

/// Dimensionality of descriptors and visual words.
pub const DESCRIPTOR_DIM: usize = 128;

/// Byte length of one record's float payload (the delimiter excluded).
const RECORD_FLOAT_BYTES: usize = DESCRIPTOR_DIM * 4;

/// The fixed, ordered collection of all visual words.
///
/// Loaded once at process startup and never mutated afterwards; shared
/// read-only across all concurrent request processing.
#[derive(Debug)]
pub struct Vocabulary {
    /// Row-major storage: word `n` occupies `data[n * 128 .. (n + 1) * 128]`.
    data: Vec<f32>,
}

impl Vocabulary {
    /// Reads all complete records from the given vocabulary file.
    ///
    /// This does NOT check the row count against the configured vocabulary
    /// size; that fatal check belongs to the startup path
    /// ([`load_resources`](crate::load_resources)), which knows the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VocabularyUnreadable`] if the file cannot be opened,
    /// or [`Error::Io`] on a read failure other than a truncated trailing
    /// record.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::VocabularyUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        let mut data = Vec::new();
        let mut record = [0u8; RECORD_FLOAT_BYTES];
        let mut delimiter = Vec::with_capacity(4);
        loop {
            match reader.read_exact(&mut record) {
                Ok(()) => {}
                // Truncated trailing record: drop it and stop, keeping
                // everything read so far.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            data.extend(
                record
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
            // Consume up to and including the record delimiter. EOF here is
            // fine: a final record without its newline still counts.
            delimiter.clear();
            reader.read_until(b'\n', &mut delimiter)?;
        }

        let vocabulary = Self { data };
        tracing::info!(
            words = vocabulary.len(),
            path = %path.display(),
            "vocabulary loaded"
        );
        Ok(vocabulary)
    }

    /// Builds a vocabulary directly from row-major word data.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not a whole number of 128-float rows.
    #[must_use]
    pub fn from_words(data: Vec<f32>) -> Self {
        assert_eq!(
            data.len() % DESCRIPTOR_DIM,
            0,
            "word data must be a whole number of {DESCRIPTOR_DIM}-float rows"
        );
        Self { data }
    }

    /// Number of words in the vocabulary.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / DESCRIPTOR_DIM
    }

    /// Returns `true` if no complete record was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the word at the given 0-based position.
    ///
    /// # Panics
    ///
    /// Panics if `word_id >= self.len()`.
    #[must_use]
    pub fn word(&self, word_id: usize) -> &[f32] {
        &self.data[word_id * DESCRIPTOR_DIM..(word_id + 1) * DESCRIPTOR_DIM]
    }

    /// Iterates the words in positional order.
    pub fn words(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(DESCRIPTOR_DIM)
    }
}
