//! The per-request ingestion pipeline.
//!
//! One request moves through `decode → size validation → extraction →
//! quantization → persistence`, failing out of any step into a single error
//! that [`ResponseCode`](crate::response::ResponseCode) maps for the caller.
//! Steps are ordered so that rejections (decode, size policy) happen before
//! the hit file is created: a rejected image leaves nothing on disk.
//!
//! Persistence is deliberately not transactional. A write failure aborts the
//! request but does not retract bytes already written; the downstream index
//! builder discards files whose size is not a whole number of records.

use std::path::PathBuf;

use crate::config::QuantizerConfig;
use crate::error::{Error, Result};
use crate::features::{ExtractionError, FeatureExtractor};
use crate::hits::{Hit, HitFile};
use crate::index::WordIndex;
use crate::quantize::quantize_pose;

/// One caller-supplied unit of work.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Caller-assigned identifier, unique by caller contract. Two concurrent
    /// requests sharing an identifier race on the same hit file path; this
    /// core does not detect or serialize that case.
    pub image_id: u16,
    /// The encoded image bytes, as received.
    pub bytes: Vec<u8>,
}

impl ImageRequest {
    /// Builds a request from an identifier and encoded image bytes.
    #[must_use]
    pub fn new(image_id: u16, bytes: Vec<u8>) -> Self {
        Self { image_id, bytes }
    }
}

/// What a successful ingestion produced.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Keypoints the detector found (zero is valid).
    pub keypoints: usize,
    /// Hit records written: `keypoints * neighbors`.
    pub hits: u64,
    /// Path of the completed hit file.
    pub hit_file: PathBuf,
}

/// Runs one request through the full pipeline.
pub(crate) fn ingest(
    request: &ImageRequest,
    extractor: &dyn FeatureExtractor,
    index: &WordIndex,
    config: &QuantizerConfig,
) -> Result<IngestReport> {
    let image = extractor.decode(&request.bytes).map_err(|e| match e {
        ExtractionError::Decode(msg) | ExtractionError::Detection(msg) => {
            Error::ImageNotDecoded(msg)
        }
    })?;

    let (width, height) = (image.width(), image.height());
    if width > config.max_image_dimension || height > config.max_image_dimension {
        return Err(Error::ImageTooLarge {
            width,
            height,
            limit: config.max_image_dimension,
        });
    }
    if width < config.min_image_dimension || height < config.min_image_dimension {
        return Err(Error::ImageTooSmall {
            width,
            height,
            limit: config.min_image_dimension,
        });
    }

    let keypoints = extractor.extract(&image).map_err(|e| match e {
        ExtractionError::Decode(msg) | ExtractionError::Detection(msg) => {
            Error::FeatureExtraction(msg)
        }
    })?;
    tracing::debug!(
        image_id = request.image_id,
        keypoints = keypoints.len(),
        "features extracted"
    );

    let mut hit_file = HitFile::create(&config.output_dir, request.image_id)?;
    for keypoint in &keypoints {
        let pose = quantize_pose(keypoint, width, height);
        let neighbors = index.knn(&keypoint.descriptor, config.neighbors)?;
        for neighbor in neighbors {
            hit_file.append(&Hit {
                word_id: neighbor.word_id,
                image_id: request.image_id,
                angle: pose.angle,
                x: pose.x,
                y: pose.y,
            })?;
        }
    }

    let hit_file_path = hit_file.path().to_path_buf();
    let hits = hit_file.finish()?;
    Ok(IngestReport {
        keypoints: keypoints.len(),
        hits,
        hit_file: hit_file_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{GrayImage, Keypoint};
    use crate::hits::{read_hits, HIT_RECORD_BYTES};
    use crate::index::BuildParams;
    use crate::vocabulary::{Vocabulary, DESCRIPTOR_DIM};

    /// Decodes any non-empty buffer into a fixed-size image and returns a
    /// canned keypoint list.
    struct StubExtractor {
        width: u32,
        height: u32,
        keypoints: Vec<Keypoint>,
    }

    impl FeatureExtractor for StubExtractor {
        fn decode(&self, bytes: &[u8]) -> std::result::Result<GrayImage, ExtractionError> {
            if bytes.is_empty() {
                return Err(ExtractionError::Decode("empty buffer".into()));
            }
            let pixels = vec![0u8; self.width as usize * self.height as usize];
            GrayImage::new(self.width, self.height, pixels)
        }

        fn extract(
            &self,
            _image: &GrayImage,
        ) -> std::result::Result<Vec<Keypoint>, ExtractionError> {
            Ok(self.keypoints.clone())
        }
    }

    #[allow(clippy::cast_precision_loss)] // test constants are small
    fn test_vocabulary(words: usize) -> Vocabulary {
        let mut data = Vec::with_capacity(words * DESCRIPTOR_DIM);
        for i in 0..words {
            for j in 0..DESCRIPTOR_DIM {
                data.push((i as f32 * 1.618_034 + j as f32 * 0.577_215_7).sin());
            }
        }
        Vocabulary::from_words(data)
    }

    fn test_config(output_dir: &std::path::Path) -> QuantizerConfig {
        QuantizerConfig {
            output_dir: output_dir.to_path_buf(),
            vocabulary_size: 100,
            ..QuantizerConfig::default()
        }
    }

    fn keypoint_on_word(vocabulary: &Vocabulary, word_id: usize, x: f32, y: f32) -> Keypoint {
        Keypoint {
            x,
            y,
            angle: 180.0,
            descriptor: vocabulary.word(word_id).to_vec(),
        }
    }

    fn no_hit_files(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn oversized_images_are_rejected_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());
        let extractor = StubExtractor {
            width: 1001,
            height: 500,
            keypoints: Vec::new(),
        };

        let err = ingest(
            &ImageRequest::new(1, vec![1]),
            &extractor,
            &index,
            &test_config(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { width: 1001, .. }));
        assert!(no_hit_files(dir.path()));
    }

    #[test]
    fn undersized_images_are_rejected_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());
        let extractor = StubExtractor {
            width: 256,
            height: 150,
            keypoints: Vec::new(),
        };

        let err = ingest(
            &ImageRequest::new(2, vec![1]),
            &extractor,
            &index,
            &test_config(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageTooSmall { height: 150, .. }));
        assert!(no_hit_files(dir.path()));
    }

    #[test]
    fn boundary_dimensions_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());

        for (width, height) in [(1000, 1000), (200, 200), (200, 1000)] {
            let extractor = StubExtractor {
                width,
                height,
                keypoints: Vec::new(),
            };
            let report = ingest(
                &ImageRequest::new(3, vec![1]),
                &extractor,
                &index,
                &test_config(dir.path()),
            )
            .unwrap();
            assert_eq!(report.hits, 0);
        }
    }

    #[test]
    fn undecodable_bytes_are_rejected_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());
        let extractor = StubExtractor {
            width: 256,
            height: 256,
            keypoints: Vec::new(),
        };

        let err = ingest(
            &ImageRequest::new(4, Vec::new()),
            &extractor,
            &index,
            &test_config(dir.path()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ImageNotDecoded(_)));
        assert!(no_hit_files(dir.path()));
    }

    #[test]
    fn zero_keypoints_yields_an_empty_hit_file() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());
        let extractor = StubExtractor {
            width: 256,
            height: 256,
            keypoints: Vec::new(),
        };

        let report = ingest(
            &ImageRequest::new(5, vec![1]),
            &extractor,
            &index,
            &test_config(dir.path()),
        )
        .unwrap();
        assert_eq!(report.keypoints, 0);
        assert_eq!(report.hits, 0);
        assert_eq!(std::fs::metadata(&report.hit_file).unwrap().len(), 0);
    }

    #[test]
    fn each_keypoint_contributes_neighbor_count_hits_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());

        let words = [3usize, 47, 90];
        let extractor = StubExtractor {
            width: 256,
            height: 256,
            keypoints: words
                .iter()
                .map(|&w| keypoint_on_word(&vocabulary, w, 64.0, 192.0))
                .collect(),
        };

        let report = ingest(
            &ImageRequest::new(6, vec![1]),
            &extractor,
            &index,
            &test_config(dir.path()),
        )
        .unwrap();
        assert_eq!(report.keypoints, 3);
        assert_eq!(report.hits, 12);
        assert_eq!(
            std::fs::metadata(&report.hit_file).unwrap().len(),
            12 * HIT_RECORD_BYTES as u64
        );

        let hits = read_hits(&report.hit_file).unwrap();
        assert_eq!(hits.len(), 12);
        for (group, &word) in words.iter().enumerate() {
            let records = &hits[group * 4..(group + 1) * 4];
            // Rank 0 is the exact descriptor's own word.
            assert_eq!(records[0].word_id, u32::try_from(word).unwrap());
            for hit in records {
                assert_eq!(hit.image_id, 6);
                assert_eq!(hit.angle, 32768); // 180 degrees
                assert_eq!(hit.x, 16384); // 64 / 256
                assert_eq!(hit.y, 49152); // 192 / 256
            }
        }
    }

    #[test]
    fn missing_output_directory_fails_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let vocabulary = test_vocabulary(100);
        let index = WordIndex::build(&vocabulary, &BuildParams::default());
        let extractor = StubExtractor {
            width: 256,
            height: 256,
            keypoints: Vec::new(),
        };

        let config = test_config(&dir.path().join("never-created"));
        let err = ingest(
            &ImageRequest::new(7, vec![1]),
            &extractor,
            &index,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, Error::FileUnwritable { .. }));
    }
}
