use std::path::Path;

use image::DynamicImage;
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};

use crate::{CaptionError, RgbImage};

/// Decode an encoded image (png, jpeg, webp, gif, bmp, ...) into an rgb8 image.
///
/// Any color mode is accepted; grayscale, alpha and 16-bit inputs are converted to three
/// 8-bit channels.
///
/// # Errors
///
/// Returns [`CaptionError::InvalidInputKind`] if the bytes are not an image.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, CaptionError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| CaptionError::InvalidInputKind(e.to_string()))?;
    rgb_from_dynamic(decoded)
}

/// Read and decode an image file into an rgb8 image.
pub fn read_image(path: impl AsRef<Path>) -> Result<RgbImage, CaptionError> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// Convert an image of any color mode into an rgb8 image.
pub fn rgb_from_dynamic(image: DynamicImage) -> Result<RgbImage, CaptionError> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return Err(CaptionError::InvalidInputKind(format!(
            "empty image of size {width}x{height}"
        )));
    }

    let data = image.to_rgb8().into_raw();
    let rgb = Image::new(ImageSize { width, height }, data, CpuAllocator)?;

    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("png encoding");
        buf.into_inner()
    }

    #[test]
    fn decode_rgb_png() -> Result<(), CaptionError> {
        let red = image::RgbImage::from_pixel(100, 100, image::Rgb([255, 0, 0]));
        let bytes = encode_png(DynamicImage::ImageRgb8(red));

        let rgb = decode_image(&bytes)?;
        assert_eq!(rgb.width(), 100);
        assert_eq!(rgb.height(), 100);
        assert_eq!(rgb.num_channels(), 3);
        assert_eq!(&rgb.as_slice()[..3], &[255, 0, 0]);

        Ok(())
    }

    #[test]
    fn decode_grayscale_expands_channels() -> Result<(), CaptionError> {
        let gray = image::GrayImage::from_pixel(8, 4, image::Luma([77]));
        let bytes = encode_png(DynamicImage::ImageLuma8(gray));

        let rgb = decode_image(&bytes)?;
        assert_eq!(rgb.width(), 8);
        assert_eq!(rgb.height(), 4);
        assert_eq!(rgb.as_slice().len(), 8 * 4 * 3);
        assert!(rgb.as_slice().iter().all(|&v| v == 77));

        Ok(())
    }

    #[test]
    fn rgba_drops_alpha() -> Result<(), CaptionError> {
        let rgba = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 0]));
        let rgb = rgb_from_dynamic(DynamicImage::ImageRgba8(rgba))?;
        assert_eq!(&rgb.as_slice()[..3], &[10, 20, 30]);
        Ok(())
    }

    #[test]
    fn not_an_image() {
        let res = decode_image(b"definitely not an image");
        assert!(matches!(res, Err(CaptionError::InvalidInputKind(_))));
    }

    #[test]
    fn empty_image() {
        let empty = DynamicImage::new_rgb8(0, 0);
        let res = rgb_from_dynamic(empty);
        assert!(matches!(res, Err(CaptionError::InvalidInputKind(_))));
    }

    #[test]
    fn missing_file() {
        let res = read_image("does/not/exist.png");
        assert!(matches!(res, Err(CaptionError::IoError(_))));
    }
}
