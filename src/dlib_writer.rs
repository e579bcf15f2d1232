//! Encoder for dlib's binary serialization, the inverse of [`crate::dlib_parser`].

use std::io::{self, Write};

use nalgebra::DVector;

use crate::dlib_parser::{IS_INF, IS_NAN, IS_NINF};
use crate::predictor::ShapePredictor;

// https://github.com/davisking/dlib/blob/master/dlib/serialize.h#L250
pub(crate) fn write_int<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    let mut magnitude = value.unsigned_abs();
    let mut buf = [0u8; 9];
    let mut size = 0;

    while magnitude != 0 {
        size += 1;
        buf[size] = (magnitude & 0xFF) as u8;
        magnitude >>= 8;
    }

    buf[0] = size as u8;
    if value < 0 {
        buf[0] |= 0x80;
    }

    writer.write_all(&buf[..= size])
}

fn write_len<W: Write>(writer: &mut W, len: usize) -> io::Result<()> {
    write_int(writer, len as i64)
}

/// Floats are written exactly as an integer mantissa and a power-of-two exponent.
pub(crate) fn write_float<W: Write>(writer: &mut W, value: f32) -> io::Result<()> {
    let (mantissa, exponent) = if value.is_nan() {
        (0, IS_NAN)
    } else if value == f32::INFINITY {
        (0, IS_INF)
    } else if value == f32::NEG_INFINITY {
        (0, IS_NINF)
    } else if value == 0.0 {
        (0, 0)
    } else {
        let bits = value.to_bits();
        let biased_exponent = i64::from((bits >> 23) & 0xFF);
        let fraction = i64::from(bits & 0x7F_FFFF);

        let (mantissa, exponent) = if biased_exponent == 0 {
            // Subnormal
            (fraction, -126 - 23)
        } else {
            (fraction | 0x80_0000, biased_exponent - 127 - 23)
        };

        if bits >> 31 == 1 { (-mantissa, exponent) } else { (mantissa, exponent) }
    };

    write_int(writer, mantissa)?;
    write_int(writer, exponent)
}

fn write_column_vector<W: Write>(writer: &mut W, vector: &DVector<f32>) -> io::Result<()> {
    write_int(writer, -(vector.len() as i64))?;
    write_int(writer, -1)?;

    for &value in vector.iter() {
        write_float(writer, value)?;
    }

    Ok(())
}

/// Serialize a shape predictor the way dlib's `serialize(shape_predictor)` does.
pub fn write_shape_predictor<W: Write>(writer: &mut W, predictor: &ShapePredictor) -> io::Result<()> {
    write_int(writer, 1)?;
    write_column_vector(writer, &predictor.initial_shape)?;

    write_len(writer, predictor.forests.len())?;
    for forest in &predictor.forests {
        write_len(writer, forest.len())?;

        for tree in forest {
            write_len(writer, tree.splits.len())?;
            for split in &tree.splits {
                write_len(writer, split.idx1)?;
                write_len(writer, split.idx2)?;
                write_float(writer, split.thresh)?;
            }

            write_len(writer, tree.leaf_values.len())?;
            for leaf in &tree.leaf_values {
                write_column_vector(writer, leaf)?;
            }
        }
    }

    write_len(writer, predictor.anchor_idx.len())?;
    for anchors in &predictor.anchor_idx {
        write_len(writer, anchors.len())?;
        for &anchor in anchors {
            write_len(writer, anchor)?;
        }
    }

    write_len(writer, predictor.deltas.len())?;
    for deltas in &predictor.deltas {
        write_len(writer, deltas.len())?;
        for delta in deltas {
            write_float(writer, delta.x)?;
            write_float(writer, delta.y)?;
        }
    }

    Ok(())
}
