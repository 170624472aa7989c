//! The hit record codec and the per-image hit file lifecycle.
//!
//! # On-disk format
//!
//! One file per image identifier, `<output_dir>/<image_id>.dat`, holding
//! back-to-back fixed 12-byte little-endian records:
//!
//! ```text
//! u32 word_id | u16 image_id | u16 angle | u16 x | u16 y
//! ```
//!
//! No header, no framing, no count field: record `n` lives at byte offset
//! `n * 12` and the record count is implicit in the file size. Writes are not
//! transactional; a failure partway through leaves a truncated file that the
//! downstream index builder detects by `size % 12 != 0`.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Serialized size of one hit record, in bytes.
pub const HIT_RECORD_BYTES: usize = 12;

/// One quantized observation: an image saw a visual word at a pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Positional identifier of the matched visual word.
    pub word_id: u32,
    /// Caller-assigned identifier of the source image.
    pub image_id: u16,
    /// Quantized keypoint orientation.
    pub angle: u16,
    /// Quantized keypoint x position.
    pub x: u16,
    /// Quantized keypoint y position.
    pub y: u16,
}

impl Hit {
    /// Encodes the record as 12 little-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HIT_RECORD_BYTES] {
        let mut bytes = [0u8; HIT_RECORD_BYTES];
        bytes[0..4].copy_from_slice(&self.word_id.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.image_id.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.angle.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.x.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.y.to_le_bytes());
        bytes
    }

    /// Decodes a record from 12 little-endian bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; HIT_RECORD_BYTES]) -> Self {
        Self {
            word_id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            image_id: u16::from_le_bytes([bytes[4], bytes[5]]),
            angle: u16::from_le_bytes([bytes[6], bytes[7]]),
            x: u16::from_le_bytes([bytes[8], bytes[9]]),
            y: u16::from_le_bytes([bytes[10], bytes[11]]),
        }
    }
}

/// The durable per-image output file.
///
/// Exclusively owned by the one pipeline invocation processing its image.
/// Two requests sharing an image identifier would race on the same path;
/// identifier uniqueness is the caller's contract and is not checked here.
#[derive(Debug)]
pub struct HitFile {
    path: PathBuf,
    writer: BufWriter<File>,
    records: u64,
}

impl HitFile {
    /// Returns the file name used for an image identifier.
    #[must_use]
    pub fn file_name(image_id: u16) -> String {
        format!("{image_id}.dat")
    }

    /// Creates the hit file for an image inside the output directory.
    ///
    /// The output directory itself must already exist; ensuring that is a
    /// deployment responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileUnwritable`] when the destination cannot be
    /// created, including a missing output directory.
    pub fn create(output_dir: &Path, image_id: u16) -> Result<Self> {
        let path = output_dir.join(Self::file_name(image_id));
        let file = File::create(&path).map_err(|source| Error::FileUnwritable {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] on a write failure. Bytes already
    /// written are not retracted.
    pub fn append(&mut self, hit: &Hit) -> Result<()> {
        self.writer
            .write_all(&hit.to_bytes())
            .map_err(|source| Error::Persistence {
                path: self.path.clone(),
                source,
            })?;
        self.records += 1;
        Ok(())
    }

    /// Flushes and closes the file, returning the number of records written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the final flush fails.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush().map_err(|source| Error::Persistence {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.records)
    }

    /// Path of the file being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }
}

/// Reads back every record of a hit file.
///
/// This is the downstream-builder side of the format, kept next to the
/// encoder so the two cannot drift.
///
/// # Errors
///
/// Returns [`Error::TruncatedHitFile`] when the file size is not a whole
/// number of records, or [`Error::Io`] on open/read failure.
pub fn read_hits(path: &Path) -> Result<Vec<Hit>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len % HIT_RECORD_BYTES as u64 != 0 {
        return Err(Error::TruncatedHitFile {
            path: path.to_path_buf(),
            len,
        });
    }

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes
        .chunks_exact(HIT_RECORD_BYTES)
        .map(|chunk| {
            let mut record = [0u8; HIT_RECORD_BYTES];
            record.copy_from_slice(chunk);
            Hit::from_bytes(record)
        })
        .collect())
}
