use nalgebra::Matrix2;

use crate::{Rectangle, Vector2};

pub struct PointTransformationAffine {
    pub m: Matrix2<f32>,
    b: Vector2
}

impl PointTransformationAffine {
    pub fn new(m: Matrix2<f32>, b: Vector2) -> Self {
        Self {
            m, b
        }
    }

    pub fn identity() -> Self {
        Self {
            m: Matrix2::identity(),
            b: Vector2::zeros()
        }
    }

    pub fn mul(&self, p: Vector2) -> Vector2 {
        self.m * p + self.b
    }

    // https://github.com/davisking/dlib/blob/master/dlib/image_processing/shape_predictor.h#L254
    /// Maps the unit square onto the rectangle: (0, 0) to the top-left corner, (1, 0) to the
    /// top-right corner and (1, 1) to the bottom-right corner.
    pub fn unnormalising(rectangle: &Rectangle) -> Self {
        let tl = rectangle.tl_corner();
        let tr = rectangle.tr_corner();
        let br = rectangle.br_corner();

        let m = Matrix2::new(
            tr.x - tl.x, br.x - tr.x,
            tr.y - tl.y, br.y - tr.y
        );

        Self::new(m, tl)
    }

    // https://github.com/davisking/dlib/blob/master/dlib/geometry/point_transforms.h#L483
    /// Least-squares similarity transform (rotation, uniform scale, translation) taking
    /// `from_points` onto `to_points`.
    pub fn find_similarity(from_points: &[Vector2], to_points: &[Vector2]) -> Self {
        debug_assert_eq!(from_points.len(), to_points.len());

        if from_points.is_empty() {
            return Self::identity();
        }

        let n = from_points.len() as f32;

        let mean_from = from_points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
        let mean_to = to_points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;

        let mut sigma_from = 0.0_f32;
        let mut cov = Matrix2::<f32>::zeros();

        for (from, to) in from_points.iter().zip(to_points) {
            let from = from - mean_from;
            sigma_from += from.norm_squared();
            cov += (to - mean_to) * from.transpose();
        }

        sigma_from /= n;
        cov /= n;

        let svd = cov.svd(true, true);
        let d = Matrix2::from_diagonal(&svd.singular_values);

        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return Self::identity()
        };

        let mut s = Matrix2::<f32>::identity();
        let det = cov.determinant();

        if det < 0.0 || (det == 0.0 && u.determinant() * v_t.determinant() < 0.0) {
            if d[(1, 1)] < d[(0, 0)] {
                s[(1, 1)] = -1.0;
            } else {
                s[(0, 0)] = -1.0;
            }
        }

        let r = u * s * v_t;

        let c = if sigma_from == 0.0 {
            1.0
        } else {
            (d * s).trace() / sigma_from
        };

        let t = mean_to - r * mean_from * c;

        Self::new(r * c, t)
    }
}
