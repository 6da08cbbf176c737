//! Pairing credential and its rendered image.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("QR code generation failed: {0}")]
    Encode(String),

    #[error("image encoding failed: {0}")]
    Image(String),
}

/// Turns a raw pairing payload into image bytes. Must be pure.
pub trait PairingRenderer: Send + Sync + 'static {
    fn render(&self, payload: &str) -> Result<Vec<u8>, RenderError>;

    /// MIME type of the bytes produced by [`render`](Self::render).
    fn content_type(&self) -> &'static str {
        "image/png"
    }
}

/// Renders the payload as a PNG QR code.
#[derive(Debug, Clone)]
pub struct QrPngRenderer {
    /// Pixels per QR module.
    pub module_size: u32,
}

impl Default for QrPngRenderer {
    fn default() -> Self {
        Self { module_size: 8 }
    }
}

impl PairingRenderer for QrPngRenderer {
    fn render(&self, payload: &str) -> Result<Vec<u8>, RenderError> {
        let qr = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        let image = qr
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .module_dimensions(self.module_size, self.module_size)
            .build();

        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| RenderError::Image(e.to_string()))?;
        Ok(bytes)
    }
}

/// The live pairing credential: raw payload plus its rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingCredential {
    pub raw: String,
    pub image: Vec<u8>,
    pub content_type: &'static str,
}

impl PairingCredential {
    /// `data:<content-type>;base64,...` form of the image, or `None` if
    /// rendering failed.
    pub fn data_uri(&self) -> Option<String> {
        if self.image.is_empty() {
            return None;
        }
        Some(format!(
            "data:{};base64,{}",
            self.content_type,
            BASE64.encode(&self.image)
        ))
    }
}
