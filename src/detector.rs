use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use image::GrayImage;
use log::debug;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::Rectangle;

/// Anything that can find faces in a grayscale image.
///
/// Rectangles come back in the detector's own order; callers must not expect them to be
/// sorted.
pub trait FaceDetector {
    fn detect(&mut self, image: &GrayImage) -> Vec<Rectangle>;
}

/// Sliding-window settings for [`SeetaDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest face, in pixels, the detector looks for.
    pub min_face_size: u32,
    pub score_threshold: f64,
    /// Scale between consecutive levels of the image pyramid, in `(0, 1)`.
    pub pyramid_scale_factor: f32,
    /// Horizontal and vertical step of the sliding window.
    pub slide_window_step: (u32, u32)
}

impl DetectorConfig {
    /// Check the settings against the ranges the SeetaFace detector accepts.
    pub fn validate(&self) -> Result<()> {
        if self.min_face_size < 20 {
            return Err(Error::InvalidConfig(format!(
                "min_face_size must be at least 20, got {}", self.min_face_size
            )));
        }

        if self.score_threshold.is_nan() || self.score_threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "score_threshold must be positive, got {}", self.score_threshold
            )));
        }

        if !(0.01 ..= 0.99).contains(&self.pyramid_scale_factor) {
            return Err(Error::InvalidConfig(format!(
                "pyramid_scale_factor must lie in [0.01, 0.99], got {}", self.pyramid_scale_factor
            )));
        }

        if self.slide_window_step.0 == 0 || self.slide_window_step.1 == 0 {
            return Err(Error::InvalidConfig(format!(
                "slide_window_step must be non-zero, got {:?}", self.slide_window_step
            )));
        }

        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: (4, 4)
        }
    }
}

/// Frontal face detector running the SeetaFace funnel-structured cascade from `rustface`.
pub struct SeetaDetector {
    detector: Box<dyn rustface::Detector>
}

impl SeetaDetector {
    /// Load the SeetaFace model (`seeta_fd_frontal_v1.0.bin`) from a file.
    pub fn from_file<P: AsRef<Path>>(path: P, config: &DetectorConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::OpenModel {
            path: path.to_path_buf(),
            source
        })?;

        debug!("loading face detector model from {}", path.display());
        Self::from_reader(BufReader::new(file), config)
    }

    pub fn from_reader<R: Read>(reader: R, config: &DetectorConfig) -> Result<Self> {
        config.validate()?;

        let model = rustface::read_model(reader).map_err(|error| Error::DetectorModel(error.to_string()))?;
        let mut detector = rustface::create_detector_with_model(model);

        detector.set_min_face_size(config.min_face_size);
        detector.set_score_thresh(config.score_threshold);
        detector.set_pyramid_scale_factor(config.pyramid_scale_factor);
        detector.set_slide_window_step(config.slide_window_step.0, config.slide_window_step.1);

        Ok(Self {
            detector
        })
    }
}

impl FaceDetector for SeetaDetector {
    fn detect(&mut self, image: &GrayImage) -> Vec<Rectangle> {
        let (width, height) = image.dimensions();
        let data = rustface::ImageData::new(image.as_raw(), width, height);

        self.detector.detect(&data)
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Rectangle::from_xywh(
                    i64::from(bbox.x()), i64::from(bbox.y()),
                    i64::from(bbox.width()), i64::from(bbox.height())
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DetectorConfig::default();
        assert_eq!(config.min_face_size, 20);
        assert_eq!(config.slide_window_step, (4, 4));
    }

    /// A SeetaFace model with an empty classifier hierarchy.
    const EMPTY_MODEL: [u8; 4] = [0; 4];

    fn rejected(config: DetectorConfig) -> bool {
        matches!(SeetaDetector::from_reader(&EMPTY_MODEL[..], &config), Err(Error::InvalidConfig(_)))
    }

    #[test]
    fn accepts_boundary_config() {
        let config = DetectorConfig {
            min_face_size: 20,
            score_threshold: 0.01,
            pyramid_scale_factor: 0.99,
            slide_window_step: (1, 1)
        };
        assert!(SeetaDetector::from_reader(&EMPTY_MODEL[..], &config).is_ok());

        let config = DetectorConfig {
            pyramid_scale_factor: 0.01,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_small_min_face_size() {
        assert!(rejected(DetectorConfig {
            min_face_size: 10,
            ..DetectorConfig::default()
        }));
    }

    #[test]
    fn rejects_non_positive_score_threshold() {
        for score_threshold in [0.0, -1.0, f64::NAN] {
            assert!(rejected(DetectorConfig {
                score_threshold,
                ..DetectorConfig::default()
            }));
        }
    }

    #[test]
    fn rejects_pyramid_scale_factor_out_of_range() {
        for pyramid_scale_factor in [0.0, 0.005, 1.0, 1.5, f32::NAN] {
            assert!(rejected(DetectorConfig {
                pyramid_scale_factor,
                ..DetectorConfig::default()
            }));
        }
    }

    #[test]
    fn rejects_zero_window_step() {
        for slide_window_step in [(0, 4), (4, 0)] {
            assert!(rejected(DetectorConfig {
                slide_window_step,
                ..DetectorConfig::default()
            }));
        }
    }

    #[test]
    fn missing_model() {
        let result = SeetaDetector::from_file("does/not/exist.bin", &DetectorConfig::default());
        assert!(matches!(result, Err(Error::OpenModel { .. })));
    }

    /// Runs the real detector when the SeetaFace model is present in `models/`.
    #[test]
    fn blank_image_has_no_faces() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/seeta_fd_frontal_v1.0.bin");
        if !path.exists() {
            eprintln!("Skipping test: {} not found", path.display());
            return;
        }

        let mut detector = SeetaDetector::from_file(&path, &DetectorConfig::default()).unwrap();
        assert!(detector.detect(&GrayImage::new(120, 120)).is_empty());
    }
}
