use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use bzip2::read::BzDecoder;
use image::{GenericImageView, GrayImage, Pixel};
use log::debug;
use nalgebra::DVector;
use num_traits::ToPrimitive;
use serde_derive::{Deserialize, Serialize};

use crate::dlib_parser;
use crate::dlib_writer;
use crate::error::{Error, Result};
use crate::serialize::ShapePredictorSerialize;
use crate::transformations::PointTransformationAffine;
use crate::{Rectangle, Vector2};

/// Shapes are stored flat as `[x0, y0, x1, y1, ...]`, in coordinates normalised to the
/// face rectangle.
pub(crate) type Shape = DVector<f32>;

/// Anything that can place landmarks inside a face rectangle.
pub trait LandmarkPredictor {
    /// Landmark positions for the face in `region`, in image coordinates.
    fn predict(&self, image: &GrayImage, region: &Rectangle) -> Vec<Vector2>;

    /// The mean landmark configuration the model was trained against.
    fn reference_shape(&self) -> Vec<Vector2>;
}

/// On-disk encodings a [`ShapePredictor`] can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// dlib's own `serialize` output, usually `*.dat`.
    Dlib,
    /// A bzip2-compressed dlib file, as distributed in dlib-models.
    DlibBz2,
    /// This crate's bincode encoding, `*.bin`.
    Native
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bz2") => ModelFormat::DlibBz2,
            Some("bin") => ModelFormat::Native,
            _ => ModelFormat::Dlib
        }
    }
}

fn get_pixel_intensity<I: GenericImageView>(image: &I, x: u32, y: u32) -> f32 {
    let pixel = image.get_pixel(x, y);
    let value = pixel.to_luma().0[0];
    value.to_f32().unwrap_or(0.0)
}

fn location(shape: &Shape, idx: usize) -> Vector2 {
    debug_assert!(idx < shape.len() / 2);
    debug_assert_eq!(shape.len() % 2, 0);

    Vector2::new(shape[idx * 2], shape[idx * 2 + 1])
}

fn points(shape: &Shape) -> Vec<Vector2> {
    (0 .. shape.len() / 2).map(|i| location(shape, i)).collect()
}

fn flatten(points: &[Vector2]) -> Shape {
    DVector::from_iterator(points.len() * 2, points.iter().flat_map(|p| [p.x, p.y]))
}

fn invalid(message: String) -> Error {
    Error::InvalidModel(message)
}

#[derive(Debug, Clone)]
pub struct ShapePredictor {
    pub(crate) initial_shape: Shape,
    pub(crate) forests: Vec<Vec<RegressionTree>>,
    pub(crate) deltas: Vec<Vec<Vector2>>,
    pub(crate) anchor_idx: Vec<Vec<usize>>
}

impl ShapePredictor {
    /// Assemble a predictor from its mean shape and cascade.
    ///
    /// `forests`, `anchor_idx` and `deltas` hold one entry per cascade stage. The split
    /// features of stage `i` index into `anchor_idx[i]` and `deltas[i]`, which name the
    /// landmark each sampled pixel is attached to and its offset from that landmark.
    pub fn new(
        mean_shape: Vec<Vector2>, forests: Vec<Vec<RegressionTree>>,
        anchor_idx: Vec<Vec<usize>>, deltas: Vec<Vec<Vector2>>
    ) -> Result<Self> {
        Self::from_parts(flatten(&mean_shape), forests, anchor_idx, deltas)
    }

    pub(crate) fn from_parts(
        initial_shape: Shape, forests: Vec<Vec<RegressionTree>>,
        anchor_idx: Vec<Vec<usize>>, deltas: Vec<Vec<Vector2>>
    ) -> Result<Self> {
        let predictor = Self {
            initial_shape, forests, deltas, anchor_idx
        };

        predictor.validate()?;
        Ok(predictor)
    }

    /// Check every index the predictor follows at run time, so that running it can never
    /// go out of bounds.
    fn validate(&self) -> Result<()> {
        let shape_len = self.initial_shape.len();

        if shape_len == 0 || shape_len % 2 != 0 {
            return Err(invalid(format!("mean shape has {} values, expected a non-empty even count", shape_len)));
        }

        let num_landmarks = shape_len / 2;
        let stages = self.forests.len();

        if self.anchor_idx.len() != stages || self.deltas.len() != stages {
            return Err(invalid(format!(
                "{} cascade stages but {} anchor sets and {} delta sets",
                stages, self.anchor_idx.len(), self.deltas.len()
            )));
        }

        for (stage, ((forest, anchors), deltas)) in self.forests.iter().zip(&self.anchor_idx).zip(&self.deltas).enumerate() {
            if anchors.len() != deltas.len() {
                return Err(invalid(format!(
                    "stage {}: {} anchors for {} deltas", stage, anchors.len(), deltas.len()
                )));
            }

            if let Some(anchor) = anchors.iter().find(|&&anchor| anchor >= num_landmarks) {
                return Err(invalid(format!(
                    "stage {}: anchor {} out of range for {} landmarks", stage, anchor, num_landmarks
                )));
            }

            for tree in forest {
                if tree.leaf_values.len() != tree.splits.len() + 1 {
                    return Err(invalid(format!(
                        "stage {}: tree with {} splits has {} leaves",
                        stage, tree.splits.len(), tree.leaf_values.len()
                    )));
                }

                if tree.splits.iter().any(|split| split.idx1 >= deltas.len() || split.idx2 >= deltas.len()) {
                    return Err(invalid(format!(
                        "stage {}: split feature out of range for {} pixels", stage, deltas.len()
                    )));
                }

                if let Some(leaf) = tree.leaf_values.iter().find(|leaf| leaf.len() != shape_len) {
                    return Err(invalid(format!(
                        "stage {}: leaf of length {}, expected {}", stage, leaf.len(), shape_len
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn num_landmarks(&self) -> usize {
        self.initial_shape.len() / 2
    }

    pub fn num_cascade_stages(&self) -> usize {
        self.forests.len()
    }

    /// The mean shape, in coordinates normalised to the face rectangle.
    pub fn mean_shape(&self) -> Vec<Vector2> {
        points(&self.initial_shape)
    }

    // https://github.com/davisking/dlib/blob/master/dlib/image_processing/shape_predictor.h#L339
    /// Run the shape predictor on an image with a specific region of interest and get the positions of landmarks.
    pub fn run<I: GenericImageView>(&self, image: &I, region: &Rectangle) -> Vec<Vector2> {
        let mut current_shape = self.initial_shape.clone();
        let mut feature_pixel_values = Vec::new();
        let tform_to_img = PointTransformationAffine::unnormalising(region);

        for (iter, forest) in self.forests.iter().enumerate() {
            self.extract_feature_pixel_values(image, &tform_to_img, &current_shape, iter, &mut feature_pixel_values);

            for tree in forest {
                current_shape += tree.find(&feature_pixel_values);
            }
        }

        points(&current_shape)
            .into_iter()
            .map(|point| tform_to_img.mul(point))
            .collect()
    }

    fn extract_feature_pixel_values<I: GenericImageView>(
        &self, image: &I, tform_to_img: &PointTransformationAffine, current_shape: &Shape, iter: usize,
        feature_pixel_values: &mut Vec<f32>
    ) {
        let reference_pixel_anchor_idx = &self.anchor_idx[iter];
        let reference_pixel_deltas = &self.deltas[iter];

        debug_assert_eq!(reference_pixel_anchor_idx.len(), reference_pixel_deltas.len());
        debug_assert_eq!(current_shape.len(), self.initial_shape.len());

        let tform = self.find_tform_between(current_shape).m;
        let area = Rectangle::from_image(image);

        feature_pixel_values.clear();
        feature_pixel_values.extend(reference_pixel_deltas.iter().zip(reference_pixel_anchor_idx).map(|(delta, &anchor)| {
            let point = tform_to_img.mul(tform * delta + location(current_shape, anchor));

            // Sample the nearest pixel, as dlib does when it converts to integer points.
            let x = (point.x + 0.5).floor() as i64;
            let y = (point.y + 0.5).floor() as i64;

            if area.contains(x, y) {
                get_pixel_intensity(image, x as u32, y as u32)
            } else {
                0.0
            }
        }));
    }

    fn find_tform_between(&self, to_shape: &Shape) -> PointTransformationAffine {
        debug_assert_eq!(self.initial_shape.len(), to_shape.len());

        if self.num_landmarks() == 1 {
            PointTransformationAffine::identity()
        } else {
            PointTransformationAffine::find_similarity(&points(&self.initial_shape), &points(to_shape))
        }
    }

    /// Load a shape predictor, picking the decoder from the file extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::OpenModel {
            path: path.to_path_buf(),
            source
        })?;

        let format = ModelFormat::from_path(path);
        debug!("loading {:?} shape predictor from {}", format, path.display());

        match format {
            ModelFormat::Dlib => dlib_parser::parse_shape_predictor(&read_all(file)?),
            ModelFormat::DlibBz2 => dlib_parser::parse_shape_predictor(&read_bz2(file)?),
            ModelFormat::Native => Self::read_from(BufReader::new(file))
        }
    }

    /// Serialize the shape predictor to a file.
    pub fn write<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(filename)?);
        let serialize = ShapePredictorSerialize::from(self);
        bincode::serialize_into(&mut writer, &serialize)?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize the shape predictor from a file in this crate's own format, whatever its
    /// extension.
    pub fn read<P: AsRef<Path>>(filename: P) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(filename)?))
    }

    fn read_from<R: Read>(reader: R) -> Result<Self> {
        let deserialize: ShapePredictorSerialize = bincode::deserialize_from(reader)?;
        deserialize.into_predictor()
    }

    /// Serialize the shape predictor in dlib's format.
    pub fn write_dlib<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(filename)?);
        dlib_writer::write_shape_predictor(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

impl LandmarkPredictor for ShapePredictor {
    fn predict(&self, image: &GrayImage, region: &Rectangle) -> Vec<Vector2> {
        self.run(image, region)
    }

    fn reference_shape(&self) -> Vec<Vector2> {
        self.mean_shape()
    }
}

/// Read just the reference shape from a dlib model file, without decoding the cascade.
pub fn read_reference_shape<P: AsRef<Path>>(path: P) -> Result<Vec<Vector2>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::OpenModel {
        path: path.to_path_buf(),
        source
    })?;

    match ModelFormat::from_path(path) {
        ModelFormat::Dlib => dlib_parser::parse_reference_shape(&read_all(file)?),
        ModelFormat::DlibBz2 => dlib_parser::parse_reference_shape(&read_bz2(file)?),
        ModelFormat::Native => Ok(ShapePredictor::read_from(BufReader::new(file))?.mean_shape())
    }
}

fn read_all(file: File) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    BufReader::new(file).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn read_bz2(file: File) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    BzDecoder::new(BufReader::new(file)).read_to_end(&mut buffer).map_err(|error| {
        if matches!(error.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput) {
            invalid(format!("bad bzip2 stream: {}", error))
        } else {
            Error::Io(error)
        }
    })?;
    Ok(buffer)
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SplitFeature {
    pub idx1: usize,
    pub idx2: usize,
    pub thresh: f32
}

impl SplitFeature {
    pub fn new(idx1: usize, idx2: usize, thresh: f32) -> Self {
        Self {
            idx1, idx2, thresh
        }
    }
}

/// A complete binary tree: split `i` has children `2i + 1` and `2i + 2`, and indices past
/// the last split address `leaf_values`.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    pub(crate) splits: Vec<SplitFeature>,
    pub(crate) leaf_values: Vec<Shape>
}

impl RegressionTree {
    /// `leaf_values` holds one shape update per leaf, as per-landmark offsets in
    /// normalised coordinates.
    pub fn new(splits: Vec<SplitFeature>, leaf_values: Vec<Vec<Vector2>>) -> Self {
        Self {
            splits,
            leaf_values: leaf_values.iter().map(|leaf| flatten(leaf)).collect()
        }
    }

    fn find(&self, feature_pixel_values: &[f32]) -> &Shape {
        debug_assert_eq!(self.leaf_values.len(), self.splits.len() + 1);

        let mut i = 0;

        while i < self.splits.len() {
            let split = &self.splits[i];
            if feature_pixel_values[split.idx1] - feature_pixel_values[split.idx2] > split.thresh {
                i = (2 * i) + 1;
            } else {
                i = (2 * i) + 2;
            }
        }

        &self.leaf_values[i - self.splits.len()]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    fn close(a: Vector2, b: Vector2) -> bool {
        (a - b).norm() < 1e-3
    }

    /// Two landmarks on a horizontal line and one single-split tree comparing the pixels
    /// under them: a bright left half nudges both landmarks right, a bright right half
    /// nudges them left.
    pub(crate) fn split_model() -> ShapePredictor {
        let tree = RegressionTree::new(
            vec![SplitFeature::new(0, 1, 0.0)],
            vec![
                vec![Vector2::new(0.1, 0.0), Vector2::new(0.1, 0.0)],
                vec![Vector2::new(-0.1, 0.0), Vector2::new(-0.1, 0.0)]
            ]
        );

        ShapePredictor::new(
            vec![Vector2::new(0.25, 0.5), Vector2::new(0.75, 0.5)],
            vec![vec![tree]],
            vec![vec![0, 1]],
            vec![vec![Vector2::zeros(), Vector2::zeros()]]
        ).unwrap()
    }

    pub(crate) fn half_lit(left_bright: bool) -> GrayImage {
        GrayImage::from_fn(100, 100, |x, _| {
            if (x < 50) == left_bright { Luma([200]) } else { Luma([0]) }
        })
    }

    #[test]
    fn mean_shape_only() {
        let predictor = ShapePredictor::new(
            vec![Vector2::new(0.5, 0.5), Vector2::new(0.0, 1.0)],
            Vec::new(), Vec::new(), Vec::new()
        ).unwrap();

        let points = predictor.run(&GrayImage::new(10, 10), &Rectangle::new(10, 20, 110, 220));

        assert_eq!(points.len(), 2);
        assert!(close(points[0], Vector2::new(60.0, 120.0)));
        assert!(close(points[1], Vector2::new(10.0, 220.0)));
    }

    #[test]
    fn tree_follows_pixels() {
        let predictor = split_model();
        let region = Rectangle::new(0, 0, 99, 99);

        let points = predictor.run(&half_lit(true), &region);
        assert!(close(points[0], Vector2::new(34.65, 49.5)));
        assert!(close(points[1], Vector2::new(84.15, 49.5)));

        let points = predictor.run(&half_lit(false), &region);
        assert!(close(points[0], Vector2::new(14.85, 49.5)));
        assert!(close(points[1], Vector2::new(64.35, 49.5)));
    }

    #[test]
    fn region_outside_image() {
        let predictor = split_model();
        let points = predictor.run(&half_lit(true), &Rectangle::new(500, 500, 599, 599));

        // All samples read as zero, so the right branch is taken.
        assert!(close(points[0], Vector2::new(514.85, 549.5)));
    }

    #[test]
    fn rgb_images_use_luma() {
        let predictor = split_model();
        let rgb = image::RgbImage::from_fn(100, 100, |x, _| {
            if x < 50 { image::Rgb([200, 200, 200]) } else { image::Rgb([0, 0, 0]) }
        });

        let points = predictor.run(&rgb, &Rectangle::new(0, 0, 99, 99));
        assert!(close(points[0], Vector2::new(34.65, 49.5)));
    }

    #[test]
    fn rejects_odd_mean_shape() {
        let result = ShapePredictor::from_parts(DVector::from_vec(vec![1.0, 2.0, 3.0]), Vec::new(), Vec::new(), Vec::new());
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn rejects_out_of_range_anchor() {
        let result = ShapePredictor::new(
            vec![Vector2::new(0.5, 0.5)],
            vec![Vec::new()],
            vec![vec![3]],
            vec![vec![Vector2::zeros()]]
        );
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn rejects_missing_leaf() {
        let tree = RegressionTree::new(vec![SplitFeature::new(0, 0, 0.0)], vec![vec![Vector2::zeros()]]);
        let result = ShapePredictor::new(
            vec![Vector2::new(0.5, 0.5)],
            vec![vec![tree]],
            vec![vec![0]],
            vec![vec![Vector2::zeros()]]
        );
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn rejects_mismatched_stage_counts() {
        let result = ShapePredictor::new(
            vec![Vector2::new(0.5, 0.5)],
            vec![Vec::new()],
            Vec::new(),
            Vec::new()
        );
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn model_formats() {
        assert_eq!(ModelFormat::from_path(Path::new("a/shape_predictor_68_face_landmarks.dat")), ModelFormat::Dlib);
        assert_eq!(ModelFormat::from_path(Path::new("a/shape_predictor_5_face_landmarks.dat.bz2")), ModelFormat::DlibBz2);
        assert_eq!(ModelFormat::from_path(Path::new("face_landmarks.bin")), ModelFormat::Native);
        assert_eq!(ModelFormat::from_path(Path::new("model")), ModelFormat::Dlib);
    }

    #[test]
    fn dlib_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.dat");

        let predictor = split_model();
        predictor.write_dlib(&path).unwrap();
        let loaded = ShapePredictor::load(&path).unwrap();

        assert_eq!(loaded.mean_shape(), predictor.mean_shape());
        assert_eq!(loaded.num_cascade_stages(), 1);

        let region = Rectangle::new(0, 0, 99, 99);
        assert_eq!(loaded.run(&half_lit(false), &region), predictor.run(&half_lit(false), &region));
    }

    #[test]
    fn native_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let predictor = split_model();
        predictor.write(&path).unwrap();
        let loaded = ShapePredictor::load(&path).unwrap();

        let region = Rectangle::new(0, 0, 99, 99);
        assert_eq!(loaded.run(&half_lit(true), &region), predictor.run(&half_lit(true), &region));
        assert_eq!(read_reference_shape(&path).unwrap(), predictor.mean_shape());
    }

    #[test]
    fn native_read_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.dat");

        let predictor = split_model();
        predictor.write(&path).unwrap();

        let region = Rectangle::new(0, 0, 99, 99);
        let read = ShapePredictor::read(&path).unwrap();
        assert_eq!(read.run(&half_lit(false), &region), predictor.run(&half_lit(false), &region));

        // The same bytes are not a dlib model.
        assert!(ShapePredictor::load(&path).unwrap_err().is_corrupt_model());
    }

    #[test]
    fn compressed_dlib() {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.dat.bz2");

        let mut raw = Vec::new();
        dlib_writer::write_shape_predictor(&mut raw, &split_model()).unwrap();

        let mut encoder = BzEncoder::new(File::create(&path).unwrap(), Compression::best());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap();

        let loaded = ShapePredictor::load(&path).unwrap();
        assert_eq!(loaded.num_landmarks(), 2);
        assert_eq!(read_reference_shape(&path).unwrap(), split_model().mean_shape());
    }

    #[test]
    fn corrupt_compressed_dlib() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.dat.bz2");
        std::fs::write(&path, b"definitely not bzip2").unwrap();

        assert!(ShapePredictor::load(&path).unwrap_err().is_corrupt_model());
    }

    #[test]
    fn missing_file() {
        match ShapePredictor::load("does/not/exist.dat") {
            Err(Error::OpenModel { source, .. }) => assert_eq!(source.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected result {:?}", other.map(|_| ()))
        }
    }

    /// Loads the 68-point model from dlib-models when it has been cloned next to the crate.
    #[test]
    fn load_68_point_model() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/shape_predictor_68_face_landmarks.dat");
        if !path.exists() {
            eprintln!("Skipping test: {} not found", path.display());
            return;
        }

        let predictor = ShapePredictor::load(&path).unwrap();
        assert_eq!(predictor.num_landmarks(), 68);
        assert_eq!(read_reference_shape(&path).unwrap(), predictor.mean_shape());
    }
}
