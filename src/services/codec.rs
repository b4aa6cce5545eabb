//! QR encoder/decoder seams and their production implementations.
//!
//! The flows only see the [`QrEncoder`] and [`QrDecoder`] traits so tests can substitute
//! doubles. [`QrCodeEncoder`] renders with the `qrcode` crate, always as a UTF-8 byte-mode
//! segment; [`RqrrDecoder`] detects and decodes with `rqrr`. Image bytes to pixels goes
//! through [`load_image`], an awaitable one-shot that resolves exactly once.

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::bits::Bits;
use qrcode::{QrCode, Version};
use std::io::Cursor;
use thiserror::Error;

pub use qrcode::EcLevel;

/// Errors raised by the codec collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("Failed to render QR image: {0}")]
    Render(String),

    #[error("Failed to load image: {0}")]
    ImageLoad(String),

    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    PixelBuffer { expected: usize, actual: usize },

    #[error("Image task failed: {0}")]
    Task(String),
}

/// Produces a renderable QR image for a piece of text.
#[cfg_attr(test, mockall::automock)]
pub trait QrEncoder: Send + Sync {
    /// Encode `text` at error-correction `level` and return PNG bytes.
    fn encode(&self, text: &str, level: EcLevel) -> Result<Vec<u8>, CodecError>;
}

/// Finds and decodes a QR symbol in a greyscale pixel buffer.
#[cfg_attr(test, mockall::automock)]
pub trait QrDecoder: Send + Sync {
    /// Returns `Ok(None)` when no decodable symbol is found.
    fn decode(&self, luma: &[u8], width: u32, height: u32) -> Result<Option<String>, CodecError>;
}

/// `qrcode`-backed encoder rendering black modules on white with a quiet zone
#[derive(Debug, Clone)]
pub struct QrCodeEncoder {
    module_scale: u32,
}

impl QrCodeEncoder {
    /// `module_scale` is the edge length of one module in pixels (minimum 1).
    pub fn new(module_scale: u32) -> Self {
        Self {
            module_scale: module_scale.max(1),
        }
    }
}

/// ECI assignment number for UTF-8
const UTF8_ECI: u32 = 26;

/// Bit stream holding `text` as a single UTF-8 byte-mode segment, in the smallest
/// normal version that fits at `level`.
///
/// The `qrcode` segment optimizer would put UTF-8 byte pairs that happen to fall in the
/// Shift_JIS ranges into Kanji mode, which scanners then read as Shift_JIS.
pub fn utf8_byte_bits(text: &str, level: EcLevel) -> Result<Bits, CodecError> {
    let data = text.as_bytes();

    for number in 1..=40 {
        let mut bits = Bits::new(Version::Normal(number));
        let fits = bits.push_eci_designator(UTF8_ECI).is_ok()
            && bits.push_byte_data(data).is_ok()
            && bits.push_terminator(level).is_ok();
        if fits {
            return Ok(bits);
        }
    }

    Err(CodecError::Encode(format!(
        "{} bytes do not fit in any QR version at {:?}",
        data.len(),
        level
    )))
}

impl QrEncoder for QrCodeEncoder {
    fn encode(&self, text: &str, level: EcLevel) -> Result<Vec<u8>, CodecError> {
        let bits = utf8_byte_bits(text, level)?;
        let code = QrCode::with_bits(bits, level).map_err(|e| CodecError::Encode(e.to_string()))?;

        let rendered = code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .module_dimensions(self.module_scale, self.module_scale)
            .build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(rendered)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CodecError::Render(e.to_string()))?;

        tracing::debug!(
            "Encoded {} bytes of text at {:?} into {} byte PNG",
            text.len(),
            level,
            png.len()
        );
        Ok(png)
    }
}

/// `rqrr`-backed decoder; the first grid that decodes wins
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl QrDecoder for RqrrDecoder {
    fn decode(&self, luma: &[u8], width: u32, height: u32) -> Result<Option<String>, CodecError> {
        let (w, h) = (width as usize, height as usize);
        let expected = w * h;
        if luma.len() != expected {
            return Err(CodecError::PixelBuffer {
                expected,
                actual: luma.len(),
            });
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| luma[y * w + x]);
        let grids = prepared.detect_grids();
        tracing::debug!("Detected {} candidate QR grid(s) in {}x{} image", grids.len(), w, h);

        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(Some(content)),
                Err(e) => tracing::debug!("Grid failed to decode: {:?}", e),
            }
        }

        Ok(None)
    }
}

/// Greyscale pixels of a decoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
}

impl LoadedImage {
    /// Decode any supported image format (PNG, JPEG, GIF, BMP, WebP) to 8-bit greyscale.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let image = image::load_from_memory(bytes).map_err(|e| CodecError::ImageLoad(e.to_string()))?;
        let grey = image.to_luma8();
        let (width, height) = grey.dimensions();

        Ok(Self {
            width,
            height,
            luma: grey.into_raw(),
        })
    }
}

/// Decode image bytes off the async executor.
///
/// Resolves once, with either the pixels or the load error.
pub async fn load_image(bytes: Vec<u8>) -> Result<LoadedImage, CodecError> {
    tokio::task::spawn_blocking(move || LoadedImage::from_bytes(&bytes))
        .await
        .map_err(|e| CodecError::Task(e.to_string()))?
}
