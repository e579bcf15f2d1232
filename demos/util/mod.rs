use face_session::Vector2;
use image::{Rgb, RgbImage};

fn plot(image: &mut RgbImage, x: i32, y: i32, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, colour);
    }
}

/// Draw the 68-point face outline; other topologies only get their points drawn.
pub fn draw_landmarks(landmarks: &[Vector2], image: &mut RgbImage) {
    if landmarks.len() == 68 {
        [
            // Chin
            &landmarks[0 .. 17],
            // Right eyebrow
            &landmarks[17 .. 22],
            // Left eyebrow
            &landmarks[22 .. 27],
            // Nose
            &landmarks[27 .. 31],
            // Bottom part of nose
            &landmarks[31 .. 36],
            &[landmarks[30], landmarks[33]],
            // Right eye
            &landmarks[36 .. 42],
            &[landmarks[36], landmarks[41]],
            // Left eye
            &landmarks[42 .. 48],
            &[landmarks[42], landmarks[47]],
            // Outer lips
            &landmarks[48 .. 60],
            &[landmarks[48], landmarks[59]],
            // Inner lips
            &landmarks[60 .. 68],
            &[landmarks[60], landmarks[67]]
        ].iter()
            .flat_map(|part| part.windows(2))
            .flat_map(|window| line_drawing::Bresenham::new((window[0].x as i32, window[0].y as i32), (window[1].x as i32, window[1].y as i32)))
            .for_each(|(x, y)| plot(image, x, y, Rgb([255, 0, 0])));
    }

    landmarks.iter()
        .for_each(|point| plot(image, point.x as i32, point.y as i32, Rgb([0, 255, 0])));
}

pub fn draw_rectangle(face: &face_session::Rectangle, image: &mut RgbImage) {
    let [left, top, right, bottom] = face.ltrb();

    for x in left ..= right {
        plot(image, x as i32, top as i32, Rgb([0, 0, 255]));
        plot(image, x as i32, bottom as i32, Rgb([0, 0, 255]));
    }

    for y in top ..= bottom {
        plot(image, left as i32, y as i32, Rgb([0, 0, 255]));
        plot(image, right as i32, y as i32, Rgb([0, 0, 255]));
    }
}
