use nalgebra::DVector;
use nom::bytes::complete::take;
use nom::combinator::{map, map_res, verify};
use nom::error::ErrorKind;
use nom::multi::{count, length_count};
use nom::number::complete::le_u8;
use nom::sequence::tuple;
use nom::IResult;

use crate::error::{Error, Result};
use crate::predictor::{RegressionTree, ShapePredictor, SplitFeature};
use crate::Vector2;

// https://github.com/davisking/dlib/blob/master/dlib/float_details.h#L43
pub(crate) const IS_INF: i64 = 32000;
pub(crate) const IS_NINF: i64 = 32001;
pub(crate) const IS_NAN: i64 = 32002;

type ParseResult<'a, O> = IResult<&'a [u8], O>;

// https://github.com/davisking/dlib/blob/master/dlib/serialize.h#L288
fn dlib_int(input: &[u8]) -> ParseResult<'_, i64> {
    let (rest, control_byte) = le_u8(input)?;
    let size = (control_byte & 0x0F) as usize;

    if size > 8 {
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::TooLarge)));
    }

    let (rest, buf) = take(size)(rest)?;

    let mut int: i64 = 0;
    for &byte in buf.iter().rev() {
        int = (int << 8) | i64::from(byte);
    }

    if control_byte >> 7 == 1 {
        int = int.wrapping_neg();
    }

    Ok((rest, int))
}

fn length(input: &[u8]) -> ParseResult<'_, usize> {
    map_res(dlib_int, usize::try_from)(input)
}

// https://github.com/davisking/dlib/blob/master/dlib/serialize.h#L134
// https://github.com/davisking/dlib/blob/master/dlib/float_details.h#L143
fn dlib_float(input: &[u8]) -> ParseResult<'_, f32> {
    let (rest, (mantissa, exponent)) = tuple((dlib_int, dlib_int))(input)?;

    let value = match exponent {
        IS_INF => f32::INFINITY,
        IS_NINF => f32::NEG_INFINITY,
        IS_NAN => f32::NAN,
        _ => ((mantissa as f64) * 2.0_f64.powi(exponent.clamp(-2048, 2048) as i32)) as f32
    };

    Ok((rest, value))
}

// https://github.com/davisking/dlib/blob/master/dlib/geometry/vector.h#L1133
fn vector2(input: &[u8]) -> ParseResult<'_, Vector2> {
    map(tuple((dlib_float, dlib_float)), |(x, y)| Vector2::new(x, y))(input)
}

// https://github.com/davisking/dlib/blob/master/dlib/image_processing/shape_predictor.h#L34
fn split_feature(input: &[u8]) -> ParseResult<'_, SplitFeature> {
    map(tuple((length, length, dlib_float)), |(idx1, idx2, thresh)| SplitFeature {
        idx1, idx2, thresh
    })(input)
}

// https://github.com/davisking/dlib/blob/master/dlib/matrix/matrix.h#L1888
fn matrix_dimensions(input: &[u8]) -> ParseResult<'_, (usize, usize)> {
    map_res(
        tuple((dlib_int, dlib_int)),
        |(rows, cols): (i64, i64)| -> std::result::Result<(usize, usize), std::num::TryFromIntError> {
            // Newer dlib versions store negated dimensions.
            Ok((usize::try_from(rows.unsigned_abs())?, usize::try_from(cols.unsigned_abs())?))
        }
    )(input)
}

// https://github.com/davisking/dlib/blob/master/dlib/matrix/matrix.h#L1888
fn column_vector(input: &[u8]) -> ParseResult<'_, DVector<f32>> {
    let (rest, (rows, _)) = verify(matrix_dimensions, |dimensions: &(usize, usize)| dimensions.1 == 1)(input)?;
    let (rest, values) = count(dlib_float, rows)(rest)?;
    Ok((rest, DVector::from_vec(values)))
}

// https://github.com/davisking/dlib/blob/master/dlib/image_processing/shape_predictor.h#L96
fn regression_tree(input: &[u8]) -> ParseResult<'_, RegressionTree> {
    map(
        tuple((length_count(length, split_feature), length_count(length, column_vector))),
        |(splits, leaf_values)| RegressionTree {
            splits, leaf_values
        }
    )(input)
}

fn version(input: &[u8]) -> Result<(&[u8], i64)> {
    let (rest, version) = dlib_int(input).map_err(into_error)?;

    if version != 1 {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok((rest, version))
}

// https://github.com/davisking/dlib/blob/master/dlib/image_processing/shape_predictor.h#L421
pub fn parse_shape_predictor(slice: &[u8]) -> Result<ShapePredictor> {
    let (rest, _) = version(slice)?;

    let (_, (initial_shape, forests, anchor_idx, deltas)) = tuple((
        column_vector,
        length_count(length, length_count(length, regression_tree)),
        length_count(length, length_count(length, length)),
        length_count(length, length_count(length, vector2))
    ))(rest).map_err(into_error)?;

    ShapePredictor::from_parts(initial_shape, forests, anchor_idx, deltas)
}

/// Parse only the version tag and the mean shape that leads a serialized shape predictor.
pub fn parse_reference_shape(slice: &[u8]) -> Result<Vec<Vector2>> {
    let (rest, _) = version(slice)?;
    let (_, shape) = column_vector(rest).map_err(into_error)?;

    if shape.is_empty() || shape.len() % 2 != 0 {
        return Err(Error::InvalidModel(format!(
            "reference shape has {} values, expected a non-empty even count",
            shape.len()
        )));
    }

    Ok(shape.as_slice().chunks_exact(2).map(|xy| Vector2::new(xy[0], xy[1])).collect())
}

fn into_error(error: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    match error {
        nom::Err::Incomplete(_) => Error::Parse(ErrorKind::Eof),
        nom::Err::Error(error) | nom::Err::Failure(error) => Error::Parse(error.code)
    }
}
