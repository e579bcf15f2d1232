use std::path::{Path, PathBuf};

use image::GrayImage;
use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};

use crate::cache::ImageCache;
use crate::detector::{DetectorConfig, FaceDetector, SeetaDetector};
use crate::error::{Error, Result};
use crate::pixel_format::PixelBuffer;
use crate::predictor::{LandmarkPredictor, ShapePredictor};
use crate::{Rectangle, Vector2};

/// Everything needed to open a [`FaceSession`] backed by the SeetaFace detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub detector_model: PathBuf,
    #[serde(default)]
    pub predictor_model: Option<PathBuf>,
    #[serde(default)]
    pub detector: DetectorConfig
}

/// A landmark model together with the reference shape read from it.
struct LoadedModel {
    predictor: Box<dyn LandmarkPredictor>,
    reference_shape: Vec<Vector2>
}

impl LoadedModel {
    fn new(predictor: Box<dyn LandmarkPredictor>) -> Self {
        let reference_shape = predictor.reference_shape();
        Self {
            predictor, reference_shape
        }
    }
}

/// A face detector, at most one landmark model and the last image they were run on.
///
/// Operations run one at a time to completion; a session is not meant to be shared
/// between threads. Dropping the session releases the model.
pub struct FaceSession<D = SeetaDetector> {
    detector: D,
    cache: ImageCache,
    model: Option<LoadedModel>
}

impl FaceSession<SeetaDetector> {
    /// Create a session from its configuration, loading the landmark model if one is named.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let detector = SeetaDetector::from_file(&config.detector_model, &config.detector)?;

        match config.predictor_model {
            Some(ref path) => Self::with_model(detector, path),
            None => Ok(Self::new(detector))
        }
    }
}

impl<D: FaceDetector> FaceSession<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            cache: ImageCache::new(),
            model: None
        }
    }

    pub fn with_model<P: AsRef<Path>>(detector: D, path: P) -> Result<Self> {
        let mut session = Self::new(detector);
        session.load_model(path)?;
        Ok(session)
    }

    /// Load a landmark model, replacing the current one.
    ///
    /// If the file cannot be opened the session keeps its current model. Any failure after
    /// that (reading, decoding or validating the model) leaves the session with no model.
    pub fn load_model<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        match ShapePredictor::load(path) {
            Ok(predictor) => {
                debug!(
                    "loaded shape predictor with {} landmarks and {} cascade stages from {}",
                    predictor.num_landmarks(), predictor.num_cascade_stages(), path.display()
                );
                self.model = Some(LoadedModel::new(Box::new(predictor)));
                Ok(())
            },
            Err(error @ Error::OpenModel { .. }) => Err(error),
            Err(error) => {
                warn!("failed to load shape predictor from {}: {}", path.display(), error);
                self.model = None;
                Err(error)
            }
        }
    }

    /// Install an in-memory landmark model, replacing the current one.
    pub fn set_predictor<P: LandmarkPredictor + 'static>(&mut self, predictor: P) {
        self.model = Some(LoadedModel::new(Box::new(predictor)));
    }

    pub fn unload_model(&mut self) {
        self.model = None;
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// The image the next empty-buffer call would reuse.
    pub fn current_image(&self) -> Option<&GrayImage> {
        self.cache.current()
    }

    /// Find faces in `image`, or in the cached image when `image` is empty.
    ///
    /// Finding no face is not an error: the result is simply empty.
    pub fn detect(&mut self, image: &PixelBuffer<'_>) -> Result<Vec<Rectangle>> {
        let image = self.cache.ingest(image)?;
        let faces = self.detector.detect(image);

        if faces.is_empty() {
            info!("No face detected.");
        } else {
            debug!("detected {} face(s)", faces.len());
        }

        Ok(faces)
    }

    /// Place the model's landmarks inside `region` of `image`, or of the cached image when
    /// `image` is empty.
    ///
    /// Points come back in landmark order. An empty result means the model produced no
    /// landmarks. A region with `left > right` or `top > bottom` is rejected before the
    /// image is touched.
    pub fn fit(&mut self, image: &PixelBuffer<'_>, region: &Rectangle) -> Result<Vec<Vector2>> {
        let model = self.model.as_ref().ok_or(Error::ModelNotLoaded)?;

        if region.is_empty() {
            return Err(Error::EmptyRegion(*region));
        }

        let image = self.cache.ingest(image)?;

        let points = model.predictor.predict(image, region);

        if points.is_empty() {
            info!("Landmark fit returned no points.");
        }

        Ok(points)
    }

    /// The loaded model's reference shape, one point per landmark.
    pub fn reference_shape(&self) -> Result<Vec<Vector2>> {
        self.model
            .as_ref()
            .map(|model| model.reference_shape.clone())
            .ok_or(Error::ModelNotLoaded)
    }
}
