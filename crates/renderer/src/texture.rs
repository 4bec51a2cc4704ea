use std::fmt;

use thiserror::Error;

use crate::types::SamplerMode;

/// Opaque blue, shown while an image is still decoding.
pub const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 255, 255];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image data is empty")]
    Empty,

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decoded RGBA8 pixels ready for upload.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl DecodedImage {
    pub fn solid(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let count = (width as usize) * (height as usize);
        let mut rgba = Vec::with_capacity(count * 4);
        for _ in 0..count {
            rgba.extend_from_slice(&pixel);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn placeholder() -> Self {
        Self::solid(1, 1, PLACEHOLDER_PIXEL)
    }

    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    pub fn sampler_mode(&self) -> SamplerMode {
        if self.is_power_of_two() {
            SamplerMode::Mipmapped
        } else {
            SamplerMode::ClampNearest
        }
    }
}

/// Decodes any format the `image` crate recognises from its header bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_png_into_rgba() {
        let decoded = decode_image(&png_bytes(3, 2)).expect("decode png");
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.rgba.len(), 3 * 2 * 4);
        assert_eq!(&decoded.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn rejects_garbage_and_empty_input() {
        assert!(matches!(decode_image(&[]), Err(DecodeError::Empty)));
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn npot_images_are_clamped() {
        assert_eq!(
            DecodedImage::solid(4, 8, [0; 4]).sampler_mode(),
            SamplerMode::Mipmapped
        );
        assert_eq!(
            DecodedImage::solid(3, 8, [0; 4]).sampler_mode(),
            SamplerMode::ClampNearest
        );
        assert_eq!(DecodedImage::placeholder().rgba, PLACEHOLDER_PIXEL.to_vec());
    }
}
