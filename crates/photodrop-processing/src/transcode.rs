//! HEIC/HEIF to JPEG conversion
//!
//! Conversion is best effort: any decode or encode failure yields
//! [`Transcoded::Unchanged`] and the caller uploads the original bytes.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};

/// Extensions of the image containers that get converted before upload.
pub const LEGACY_IMAGE_EXTENSIONS: [&str; 2] = ["heic", "heif"];

const TARGET_EXTENSION: &str = "jpeg";
const JPEG_QUALITY: u8 = 90;

pub fn is_legacy_extension(extension: &str) -> bool {
    LEGACY_IMAGE_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

/// Decodes the legacy container into a raster image.
pub trait LegacyImageDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> anyhow::Result<DynamicImage>;
}

/// Decoder backed by the `image` crate's format detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl LegacyImageDecoder for ImageCrateDecoder {
    fn decode(&self, data: &[u8]) -> anyhow::Result<DynamicImage> {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        Ok(reader.decode()?)
    }
}

/// Decoder backed by the system libheif, falling back to the `image` crate.
#[cfg(feature = "heif")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HeifDecoder;

#[cfg(feature = "heif")]
impl LegacyImageDecoder for HeifDecoder {
    fn decode(&self, data: &[u8]) -> anyhow::Result<DynamicImage> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let decode_heif = || -> anyhow::Result<DynamicImage> {
            let lib_heif = LibHeif::new();
            let ctx = HeifContext::read_from_bytes(data)?;
            let handle = ctx.primary_image_handle()?;
            let decoded = lib_heif.decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;
            let plane = decoded
                .planes()
                .interleaved
                .ok_or_else(|| anyhow::anyhow!("HEIF image has no interleaved plane"))?;

            let row_len = plane.width as usize * 3;
            let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
            for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
                pixels.extend_from_slice(&row[..row_len]);
            }
            let buffer = image::RgbImage::from_raw(plane.width, plane.height, pixels)
                .ok_or_else(|| anyhow::anyhow!("HEIF plane size mismatch"))?;
            Ok(DynamicImage::ImageRgb8(buffer))
        };

        decode_heif().or_else(|heif_err| {
            tracing::debug!(error = %heif_err, "libheif decode failed, trying image crate");
            ImageCrateDecoder.decode(data)
        })
    }
}

/// True when this build can decode real HEIC/HEIF payloads. Without it
/// only payloads the `image` crate recognises are converted.
pub const HEIF_SUPPORT: bool = cfg!(feature = "heif");

/// The decoder used when none is configured.
pub fn default_decoder() -> std::sync::Arc<dyn LegacyImageDecoder> {
    #[cfg(feature = "heif")]
    {
        std::sync::Arc::new(HeifDecoder)
    }
    #[cfg(not(feature = "heif"))]
    {
        std::sync::Arc::new(ImageCrateDecoder)
    }
}

/// Result of [`transcode_legacy_image`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transcoded {
    Converted {
        bytes: Bytes,
        file_name: String,
        extension: String,
    },
    Unchanged,
}

/// Convert a HEIC/HEIF payload to JPEG.
///
/// Returns `Unchanged` for other extensions and for any failure.
pub fn transcode_legacy_image(
    decoder: &dyn LegacyImageDecoder,
    data: &[u8],
    file_name: &str,
    extension: &str,
) -> Transcoded {
    if !is_legacy_extension(extension) {
        return Transcoded::Unchanged;
    }

    tracing::debug!(file_name, "Converting HEIC/HEIF image");
    match decoder.decode(data).and_then(encode_jpeg) {
        Ok(bytes) => {
            let file_name = replace_extension(file_name, extension);
            tracing::debug!(file_name = %file_name, size = bytes.len(), "Converted HEIC/HEIF image");
            Transcoded::Converted {
                bytes,
                file_name,
                extension: TARGET_EXTENSION.to_string(),
            }
        }
        Err(e) => {
            tracing::debug!(file_name, error = %e, "Failed to convert HEIC/HEIF image");
            Transcoded::Unchanged
        }
    }
}

fn encode_jpeg(img: DynamicImage) -> anyhow::Result<Bytes> {
    let rgb_img = img.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(&rgb_img)?;
    Ok(Bytes::from(buffer))
}

fn replace_extension(file_name: &str, extension: &str) -> String {
    let suffix = format!(".{}", extension.to_lowercase());
    if file_name.to_lowercase().ends_with(&suffix) {
        let stem = &file_name[..file_name.len() - suffix.len()];
        format!("{}.{}", stem, TARGET_EXTENSION)
    } else {
        format!("{}.{}", file_name, TARGET_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 30, 30]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    /// Leading `ftyp` box of a HEIC file.
    const HEIC_FTYP: &[u8] = &[
        0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', 0x00, 0x00, 0x00,
        0x00, b'm', b'i', b'f', b'1', b'h', b'e', b'i', b'c',
    ];

    #[test]
    fn test_any_decodable_payload_is_converted_to_jpeg() {
        let result = transcode_legacy_image(&ImageCrateDecoder, &png_bytes(), "photo.heic", "heic");
        match result {
            Transcoded::Converted {
                bytes,
                file_name,
                extension,
            } => {
                assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
                assert_eq!(file_name, "photo.jpeg");
                assert_eq!(extension, "jpeg");
            }
            Transcoded::Unchanged => panic!("expected conversion"),
        }
    }

    #[test]
    fn test_image_crate_does_not_recognise_heic_brand() {
        assert!(ImageCrateDecoder.decode(HEIC_FTYP).is_err());
        let result = transcode_legacy_image(&ImageCrateDecoder, HEIC_FTYP, "a.heic", "heic");
        assert_eq!(result, Transcoded::Unchanged);
    }

    #[cfg(feature = "heif")]
    fn heic_bytes(width: u32, height: u32) -> Vec<u8> {
        use libheif_rs::{
            Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, LibHeif,
            RgbChroma,
        };

        let lib_heif = LibHeif::new();
        let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb)).unwrap();
        image
            .create_plane(Channel::Interleaved, width, height, 8)
            .unwrap();
        {
            let planes = image.planes_mut();
            let mut plane = planes.interleaved.unwrap();
            let stride = plane.stride;
            for y in 0..height as usize {
                let row = &mut plane.data[y * stride..y * stride + width as usize * 3];
                for px in row.chunks_mut(3) {
                    px.copy_from_slice(&[30, 140, 220]);
                }
            }
        }

        let mut encoder = lib_heif
            .encoder_for_format(CompressionFormat::Hevc)
            .unwrap();
        encoder.set_quality(EncoderQuality::Lossy(80)).unwrap();
        let mut context = HeifContext::new().unwrap();
        context.encode_image(&image, &mut encoder, None).unwrap();
        context.write_to_bytes().unwrap()
    }

    #[cfg(feature = "heif")]
    #[test]
    fn test_real_heic_is_converted_to_jpeg() {
        let heic = heic_bytes(16, 16);
        assert_eq!(&heic[4..12], b"ftypheic");

        match transcode_legacy_image(&HeifDecoder, &heic, "IMG_0001.HEIC", "heic") {
            Transcoded::Converted {
                bytes,
                file_name,
                extension,
            } => {
                assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
                assert_eq!(file_name, "IMG_0001.jpeg");
                assert_eq!(extension, "jpeg");
                let decoded = image::load_from_memory(&bytes).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (16, 16));
            }
            Transcoded::Unchanged => panic!("expected conversion"),
        }
    }

    #[test]
    fn test_garbage_is_unchanged() {
        let result = transcode_legacy_image(&ImageCrateDecoder, b"not an image", "a.heif", "heif");
        assert_eq!(result, Transcoded::Unchanged);
    }

    #[test]
    fn test_other_extensions_are_untouched() {
        let result = transcode_legacy_image(&ImageCrateDecoder, &png_bytes(), "a.png", "png");
        assert_eq!(result, Transcoded::Unchanged);
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(replace_extension("img_1.heif", "heif"), "img_1.jpeg");
        assert_eq!(replace_extension("noext", "heic"), "noext.jpeg");
    }
}
