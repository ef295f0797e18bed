//! QR code rendering for share URLs.

use crate::config::{ConfigError, QrConfig};
use crate::error::{DropError, Result};
use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use tracing::{debug, instrument};

/// Renders text payloads as PNG QR codes
#[derive(Debug, Clone)]
pub struct QrAdvertiser {
    size: u32,
    ec_level: EcLevel,
}

impl QrAdvertiser {
    /// Create an advertiser rendering images of exactly `size` pixels square.
    ///
    /// A symbol that cannot fit at one pixel per module gets a larger canvas.
    pub fn new(size: u32, ec_level: EcLevel) -> Self {
        Self { size, ec_level }
    }

    pub fn from_config(config: &QrConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(config.size, config.ec_level()?))
    }

    /// Encode `content` into a PNG image
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub fn encode(&self, content: &str) -> Result<Vec<u8>> {
        if content.is_empty() {
            return Err(DropError::EmptyContent);
        }

        let code = QrCode::with_error_correction_level(content.as_bytes(), self.ec_level)
            .map_err(|e| match e {
                QrError::DataTooLong => DropError::ContentTooLong(content.len()),
                other => DropError::QrEncode(other.to_string()),
            })?;

        let symbol = code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .max_dimensions(self.size, self.size)
            .build();

        // Modules are whole pixels, so center the symbol on a fixed white canvas.
        let (symbol_w, symbol_h) = symbol.dimensions();
        let side = self.size.max(symbol_w).max(symbol_h);
        let mut image = GrayImage::from_pixel(side, side, Luma([255]));
        imageops::overlay(
            &mut image,
            &symbol,
            i64::from((side - symbol_w) / 2),
            i64::from((side - symbol_h) / 2),
        );

        let (width, height) = image.dimensions();
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(image)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| DropError::QrEncode(e.to_string()))?;

        debug!(width = width, height = height, png_bytes = png.len(), "QR code rendered");
        Ok(png)
    }
}

impl Default for QrAdvertiser {
    fn default() -> Self {
        Self::new(256, EcLevel::M)
    }
}
