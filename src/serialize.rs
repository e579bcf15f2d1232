use nalgebra::DVector;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::predictor::{RegressionTree, ShapePredictor, SplitFeature};
use crate::Vector2;

const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct RegressionTreeSerialize {
    splits: Vec<SplitFeature>,
    leaf_values: Vec<Vec<f32>>
}

impl RegressionTreeSerialize {
    fn from(tree: &RegressionTree) -> Self {
        Self {
            splits: tree.splits.clone(),
            leaf_values: tree.leaf_values.iter().map(|leaf| leaf.as_slice().to_vec()).collect()
        }
    }

    fn to(self) -> RegressionTree {
        RegressionTree {
            splits: self.splits,
            leaf_values: self.leaf_values.into_iter().map(DVector::from_vec).collect()
        }
    }
}

/// Mirrors the layout of a dlib file: a version tag, then the mean shape, then the cascade.
#[derive(Serialize, Deserialize)]
pub struct ShapePredictorSerialize {
    version: u32,
    initial_shape: Vec<f32>,
    forests: Vec<Vec<RegressionTreeSerialize>>,
    deltas: Vec<Vec<Vector2Serialize>>,
    anchor_idx: Vec<Vec<u64>>
}

impl ShapePredictorSerialize {
    pub fn from(shape: &ShapePredictor) -> Self {
        Self {
            version: VERSION,
            initial_shape: shape.initial_shape.as_slice().to_vec(),
            forests: shape.forests.iter().map(|forest| {
                forest.iter().map(RegressionTreeSerialize::from).collect()
            }).collect(),
            deltas: shape.deltas.iter().map(|delta| {
                delta.iter().map(Vector2Serialize::from).collect()
            }).collect(),
            anchor_idx: shape.anchor_idx.iter().map(|anchors| {
                anchors.iter().map(|&anchor| anchor as u64).collect()
            }).collect()
        }
    }

    pub fn into_predictor(self) -> Result<ShapePredictor> {
        if self.version != VERSION {
            return Err(Error::UnsupportedVersion(i64::from(self.version)));
        }

        let anchor_idx = self.anchor_idx.into_iter().map(|anchors| {
            anchors.into_iter()
                .map(|anchor| usize::try_from(anchor).map_err(|_| {
                    Error::InvalidModel(format!("anchor index {} does not fit in memory", anchor))
                }))
                .collect::<Result<Vec<_>>>()
        }).collect::<Result<Vec<_>>>()?;

        ShapePredictor::from_parts(
            DVector::from_vec(self.initial_shape),
            self.forests.into_iter().map(|forest| {
                forest.into_iter().map(RegressionTreeSerialize::to).collect()
            }).collect(),
            anchor_idx,
            self.deltas.into_iter().map(|delta| {
                delta.iter().map(Vector2Serialize::to).collect()
            }).collect()
        )
    }
}

#[derive(Serialize, Deserialize)]
struct Vector2Serialize {
    x: f32,
    y: f32
}

impl Vector2Serialize {
    fn from(vector2: &Vector2) -> Self {
        Self {
            x: vector2.x,
            y: vector2.y
        }
    }

    fn to(&self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::tests::split_model;

    #[test]
    fn rejects_unknown_version() {
        let mut serialize = ShapePredictorSerialize::from(&split_model());
        serialize.version = 7;

        let bytes = bincode::serialize(&serialize).unwrap();
        let decoded: ShapePredictorSerialize = bincode::deserialize(&bytes).unwrap();

        assert!(matches!(decoded.into_predictor(), Err(Error::UnsupportedVersion(7))));
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let result = bincode::deserialize::<ShapePredictorSerialize>(&[1, 2, 3]);
        assert!(result.is_err());
    }

    #[test]
    fn keeps_tree_structure() {
        let predictor = split_model();
        let restored = ShapePredictorSerialize::from(&predictor).into_predictor().unwrap();

        assert_eq!(restored.forests[0][0].splits, predictor.forests[0][0].splits);
        assert_eq!(restored.anchor_idx, predictor.anchor_idx);
    }
}
