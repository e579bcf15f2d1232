//! Detect faces in a picture, fit landmarks to each and save the annotated result.
//!
//! `cargo run --example image -- <picture> [seeta model] [landmark model]`

mod util;

use face_session::pixel_format::planar_column_major_from_rgb;
use face_session::{FaceSession, PixelBuffer, SessionConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let filename = args.next().ok_or("usage: image <picture> [seeta model] [landmark model]")?;
    let detector_model = args.next().unwrap_or_else(|| "models/seeta_fd_frontal_v1.0.bin".to_string());
    let predictor_model = args.next().unwrap_or_else(|| "models/shape_predictor_68_face_landmarks.dat".to_string());

    let mut session = FaceSession::open(&SessionConfig {
        detector_model: detector_model.into(),
        predictor_model: Some(predictor_model.into()),
        detector: Default::default()
    })?;

    let mut rgb = image::open(&filename)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let planes = planar_column_major_from_rgb(&rgb);

    let faces = session.detect(&PixelBuffer::rgb(&planes, height, width))?;
    println!("{} face(s)", faces.len());

    for face in &faces {
        let points = session.fit(&PixelBuffer::empty(), face)?;
        util::draw_rectangle(face, &mut rgb);
        util::draw_landmarks(&points, &mut rgb);
    }

    rgb.save("out.png")?;
    Ok(())
}
