use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::Rectangle;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot open model file {}: {source}", .path.display())]
    OpenModel { path: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed dlib data: {0:?}")]
    Parse(nom::error::ErrorKind),

    #[error("unsupported model version {0}")]
    UnsupportedVersion(i64),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("model serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("uint8 grayscale or RGB image required, got {0} channels")]
    UnsupportedChannelCount(usize),

    #[error("pixel buffer holds {actual} samples, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("image of {height}x{width} has no pixels")]
    DegenerateImage { height: usize, width: usize },

    #[error("no image has been supplied yet")]
    NoImage,

    #[error("shape predictor not loaded")]
    ModelNotLoaded,

    #[error("face detector model error: {0}")]
    DetectorModel(String),

    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),

    #[error("face region {:?} has no pixels", .0.ltrb())]
    EmptyRegion(Rectangle),
}

impl Error {
    /// Whether the error comes from the content of a model file rather than from
    /// reaching it.
    pub fn is_corrupt_model(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::UnsupportedVersion(_)
                | Error::InvalidModel(_)
                | Error::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
