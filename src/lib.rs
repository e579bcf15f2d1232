//! Face detection and landmark fitting over caller-supplied pixel buffers.
//!
//! A [`FaceSession`] owns a face detector, at most one landmark model and the last image
//! it was given. Images arrive in the caller's layout (column-major, grayscale or three
//! R/G/B planes) and are converted once into a row-major grayscale image; passing
//! [`PixelBuffer::empty`] to a later call reuses that image.
//!
//! Landmark models are dlib shape predictors (an ensemble of regression trees), read from
//! dlib's `.dat` files, their bzip2-compressed `.dat.bz2` form, or this crate's own bincode
//! format.
//!
//! ```no_run
//! use face_session::{FaceSession, PixelBuffer, SessionConfig};
//!
//! let config = SessionConfig {
//!     detector_model: "seeta_fd_frontal_v1.0.bin".into(),
//!     predictor_model: Some("shape_predictor_68_face_landmarks.dat".into()),
//!     detector: Default::default()
//! };
//! let mut session = FaceSession::open(&config)?;
//!
//! # let (pixels, height, width) = (vec![0u8; 640 * 480], 480, 640);
//! for face in session.detect(&PixelBuffer::gray(&pixels, height, width))? {
//!     let landmarks = session.fit(&PixelBuffer::empty(), &face)?;
//!     println!("{:?}: {} landmarks", face.ltrb(), landmarks.len());
//! }
//! # Ok::<(), face_session::Error>(())
//! ```

pub type Vector2 = nalgebra::Vector2<f32>;

mod cache;
mod detector;
mod dlib_parser;
mod dlib_writer;
mod error;
pub mod pixel_format;
mod predictor;
mod rectangle;
mod serialize;
mod session;
mod transformations;

pub use cache::ImageCache;
pub use detector::{DetectorConfig, FaceDetector, SeetaDetector};
pub use error::{Error, Result};
pub use pixel_format::PixelBuffer;
pub use predictor::{read_reference_shape, LandmarkPredictor, ModelFormat, RegressionTree, ShapePredictor, SplitFeature};
pub use rectangle::Rectangle;
pub use session::{FaceSession, SessionConfig};
