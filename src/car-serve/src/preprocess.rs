use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use log::debug;

use crate::error::ClassifyError;

/// Shorter edge length after the aspect-preserving resize.
pub const RESIZE_SHORTER_EDGE: u32 = 255;

/// Side length of the center crop fed to the model.
pub const CROP_SIZE: u32 = 224;

/// Model input shape: batch, channels, height, width.
pub const INPUT_SHAPE: [u64; 4] = [1, 3, CROP_SIZE as u64, CROP_SIZE as u64];

/// Per-channel normalization constants, RGB order.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Number of f32 values in a preprocessed tensor.
pub fn input_len() -> usize {
    INPUT_SHAPE.iter().product::<u64>() as usize
}

/// Decode raw request bytes into an image. Truncated or non-image
/// bytes surface as a `Decode` error, never a panic.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage, ClassifyError> {
    Ok(image::load_from_memory(data)?)
}

/// Transform a decoded image into the model's input tensor.
///
/// Resize so the shorter edge is 255 px (triangle filter), center-crop
/// to 224x224, scale to [0,1], normalize per channel and lay out as a
/// planar CHW buffer with a leading batch dimension of one.
pub fn transform_image(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    // Aspect-preserving resize. The longer edge scales to >= 255, so
    // both axes are at least CROP_SIZE before the crop.
    let (new_width, new_height) = if width <= height {
        let scaled = (height as f64 * RESIZE_SHORTER_EDGE as f64 / width as f64).round() as u32;
        (RESIZE_SHORTER_EDGE, scaled.max(RESIZE_SHORTER_EDGE))
    } else {
        let scaled = (width as f64 * RESIZE_SHORTER_EDGE as f64 / height as f64).round() as u32;
        (scaled.max(RESIZE_SHORTER_EDGE), RESIZE_SHORTER_EDGE)
    };

    debug!(
        "preprocess: {}x{} -> resize {}x{} -> crop {}x{}",
        width, height, new_width, new_height, CROP_SIZE, CROP_SIZE
    );

    let resized = imageops::resize(&rgb, new_width, new_height, FilterType::Triangle);

    let crop_x = (new_width - CROP_SIZE) / 2;
    let crop_y = (new_height - CROP_SIZE) / 2;
    let cropped = imageops::crop_imm(&resized, crop_x, crop_y, CROP_SIZE, CROP_SIZE).to_image();

    normalize(&cropped)
}

fn normalize(cropped: &RgbImage) -> Vec<f32> {
    let side = CROP_SIZE as usize;
    let plane = side * side;
    let mut tensor = vec![0f32; 3 * plane];

    for (x, y, pixel) in cropped.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            tensor[channel * plane + offset] =
                (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn output_shape_is_fixed() {
        for (w, h) in [(640, 480), (480, 640), (1000, 1000), (2000, 300)] {
            let tensor = transform_image(&solid_image(w, h, [10, 20, 30]));
            assert_eq!(tensor.len(), input_len());
            assert_eq!(tensor.len(), 1 * 3 * 224 * 224);
        }
    }

    #[test]
    fn small_images_survive_the_crop() {
        // Both dimensions below the crop size; resize must bring the
        // shorter edge to 255 before cropping.
        for (w, h) in [(60, 40), (40, 60), (100, 223), (223, 100), (20, 300)] {
            let tensor = transform_image(&solid_image(w, h, [0, 0, 0]));
            assert_eq!(tensor.len(), input_len());
        }
    }

    #[test]
    fn normalization_matches_channel_constants() {
        // A solid white image stays solid through resize and crop, so
        // every value in channel c must be (1.0 - mean[c]) / std[c].
        let tensor = transform_image(&solid_image(300, 300, [255, 255, 255]));
        let plane = 224 * 224;
        for channel in 0..3 {
            let expected = (1.0 - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
            for &value in &tensor[channel * plane..(channel + 1) * plane] {
                assert!((value - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn zero_pixels_map_to_negative_mean_over_std() {
        let tensor = transform_image(&solid_image(256, 256, [0, 0, 0]));
        let plane = 224 * 224;
        for channel in 0..3 {
            let expected = -CHANNEL_MEAN[channel] / CHANNEL_STD[channel];
            assert!((tensor[channel * plane] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn transform_is_deterministic() {
        let img = solid_image(500, 320, [120, 80, 200]);
        assert_eq!(transform_image(&img), transform_image(&img));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let result = decode_image(b"definitely not an image");
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        // Valid PNG magic followed by nothing.
        let result = decode_image(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        assert!(matches!(result, Err(ClassifyError::Decode(_))));
    }

    #[test]
    fn valid_png_bytes_decode() {
        let mut encoded = Vec::new();
        let img = solid_image(32, 16, [200, 100, 50]);
        img.write_to(
            &mut std::io::Cursor::new(&mut encoded),
            image::ImageOutputFormat::Png,
        )
        .unwrap();

        let decoded = decode_image(&encoded).unwrap();
        assert_eq!(decoded.to_rgb8().dimensions(), (32, 16));
    }
}
