//! Convert a dlib shape predictor into the faster-loading native format.
//!
//! `cargo run --example serialiser -- <model.dat[.bz2]> <model.bin>`

use face_session::ShapePredictor;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "models/shape_predictor_68_face_landmarks.dat".to_string());
    let output = args.next().unwrap_or_else(|| "models/face_landmarks.bin".to_string());

    let predictor = ShapePredictor::load(&input)?;
    predictor.write(&output)?;

    println!(
        "{} landmarks, {} cascade stages: {} -> {}",
        predictor.num_landmarks(), predictor.num_cascade_stages(), input, output
    );
    Ok(())
}
