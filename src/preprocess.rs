use std::{io::Cursor, path::Path};

use image::{imageops::FilterType, io::Reader as ImageReader, ImageError, ImageFormat};
use thiserror::Error;

pub const INPUT_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

/// Filename suffixes accepted for uploads, as listed to clients.
pub const UPLOAD_EXTENSIONS: [&str; 6] = ["JPEG", "JPG", "PNG", "BMP", "TIFF", "WEBP"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized or unsupported image format")]
    UnsupportedFormat,
    #[error("{0}")]
    Image(#[from] ImageError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedFormat {
    Jpeg,
    Png,
    Bmp,
    Tiff,
    WebP,
}

impl SupportedFormat {
    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
            Self::WebP => ImageFormat::WebP,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Bmp => "BMP",
            Self::Tiff => "TIFF",
            Self::WebP => "WEBP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbedImage {
    pub format: SupportedFormat,
    pub width: u32,
    pub height: u32,
}

/// One decoded image as a `[1, 224, 224, 3]` row-major tensor of values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    pub const SHAPE: [u64; 4] = [1, INPUT_SIZE as u64, INPUT_SIZE as u64, CHANNELS as u64];

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub fn has_supported_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            UPLOAD_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Sniffs the container and reads only the header.
pub fn probe(image_data: &[u8]) -> Result<ProbedImage, DecodeError> {
    let reader = ImageReader::new(Cursor::new(image_data)).with_guessed_format()?;
    let format = reader
        .format()
        .and_then(SupportedFormat::from_image_format)
        .ok_or(DecodeError::UnsupportedFormat)?;
    let (width, height) = reader.into_dimensions()?;

    Ok(ProbedImage {
        format,
        width,
        height,
    })
}

pub fn decode_and_normalize(image_data: &[u8]) -> Result<ImageTensor, DecodeError> {
    let probed = probe(image_data)?;
    let img = image::load_from_memory_with_format(image_data, probed.format.image_format())?;

    // Alpha is dropped, grayscale is expanded.
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let mut data = Vec::with_capacity((INPUT_SIZE * INPUT_SIZE) as usize * CHANNELS);
    for pixel in resized.pixels() {
        data.push(pixel[0] as f32 / 255.0);
        data.push(pixel[1] as f32 / 255.0);
        data.push(pixel[2] as f32 / 255.0);
    }

    Ok(ImageTensor { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(img: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn assert_normalized(tensor: &ImageTensor) {
        assert_eq!(tensor.len(), 224 * 224 * 3);
        assert_eq!(ImageTensor::SHAPE, [1, 224, 224, 3]);
        assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn decodes_every_supported_container() {
        let rgb = DynamicImage::ImageRgb8(gradient(300, 180));
        let cases = [
            (ImageOutputFormat::Jpeg(90), SupportedFormat::Jpeg),
            (ImageOutputFormat::Png, SupportedFormat::Png),
            (ImageOutputFormat::Bmp, SupportedFormat::Bmp),
            (ImageOutputFormat::Tiff, SupportedFormat::Tiff),
        ];

        for (output, expected) in cases {
            let bytes = encode(&rgb, output);
            let probed = probe(&bytes).unwrap();
            assert_eq!(probed.format, expected);
            assert_eq!((probed.width, probed.height), (300, 180));
            assert_normalized(&decode_and_normalize(&bytes).unwrap());
        }
    }

    #[test]
    fn decodes_webp() {
        let bytes = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/leaf.webp"));
        let probed = probe(bytes).unwrap();
        assert_eq!(probed.format, SupportedFormat::WebP);
        assert_eq!(probed.format.name(), "WEBP");
        assert_eq!((probed.width, probed.height), (1, 1));
        assert_normalized(&decode_and_normalize(bytes).unwrap());
    }

    #[test]
    fn tiny_and_tall_images_are_resized_exactly() {
        for (w, h) in [(1, 1), (17, 900), (640, 3)] {
            let bytes = encode(&DynamicImage::ImageRgb8(gradient(w, h)), ImageOutputFormat::Png);
            assert_normalized(&decode_and_normalize(&bytes).unwrap());
        }
    }

    #[test]
    fn alpha_is_dropped_and_gray_is_expanded() {
        let rgba = RgbaImage::from_pixel(50, 50, Rgba([255, 0, 0, 0]));
        let bytes = encode(&DynamicImage::ImageRgba8(rgba), ImageOutputFormat::Png);
        let tensor = decode_and_normalize(&bytes).unwrap();
        assert_normalized(&tensor);
        assert_eq!(&tensor.as_slice()[..3], &[1.0, 0.0, 0.0]);

        let gray = GrayImage::from_pixel(40, 60, image::Luma([255]));
        let bytes = encode(&DynamicImage::ImageLuma8(gray), ImageOutputFormat::Png);
        let tensor = decode_and_normalize(&bytes).unwrap();
        assert_normalized(&tensor);
        assert!(tensor.as_slice().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn rejects_non_image_bytes() {
        assert!(matches!(probe(b""), Err(DecodeError::UnsupportedFormat)));
        assert!(decode_and_normalize(b"").is_err());
        assert!(decode_and_normalize(b"<html><body>nope</body></html>").is_err());
        assert!(decode_and_normalize(&[0u8; 1024]).is_err());
    }

    #[test]
    fn rejects_truncated_image() {
        let bytes = encode(&DynamicImage::ImageRgb8(gradient(64, 64)), ImageOutputFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode_and_normalize(truncated).is_err());
        assert!(decode_and_normalize(&bytes[..8]).is_err());
    }

    #[test]
    fn rejects_containers_outside_the_supported_set() {
        let bytes = encode(&DynamicImage::ImageRgb8(gradient(8, 8)), ImageOutputFormat::Gif);
        assert!(matches!(probe(&bytes), Err(DecodeError::UnsupportedFormat)));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_supported_extension("leaf.jpg"));
        assert!(has_supported_extension("LEAF.JPEG"));
        assert!(has_supported_extension("scan.Tiff"));
        assert!(has_supported_extension("photo.webp"));
        assert!(!has_supported_extension("leaf.gif"));
        assert!(!has_supported_extension("leaf"));
        assert!(!has_supported_extension("png"));
    }
}
