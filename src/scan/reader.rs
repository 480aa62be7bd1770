use rqrr::{DeQRError, PreparedImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ean::Ean13Reader;
use super::image::Bitmap;
use super::transform::Rotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolFormat {
    Qr,
    Ean13,
}

impl std::fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolFormat::Qr => f.write_str("QR"),
            SymbolFormat::Ean13 => f.write_str("EAN-13"),
        }
    }
}

/// A recognition library failure that is not a plain miss. Aborts the search.
#[derive(Debug, Clone, Error)]
#[error("{format} reader fault: {message}")]
pub struct DecodeFault {
    pub format: SymbolFormat,
    pub message: String,
}

/// Outcome of one reader on one bitmap
#[derive(Debug, Clone)]
pub enum Recognition {
    Found(String),
    NotFound,
    Fault(DecodeFault),
}

pub trait SymbolReader: Send + Sync {
    fn format(&self) -> SymbolFormat;

    /// Rotations worth trying for this symbology
    fn rotations(&self) -> &[Rotation];

    fn read(&self, bitmap: &Bitmap) -> Recognition;
}

/// Build the readers for the configured formats, in configured order.
pub fn readers_for(formats: &[SymbolFormat]) -> Vec<Box<dyn SymbolReader>> {
    formats
        .iter()
        .map(|format| -> Box<dyn SymbolReader> {
            match format {
                SymbolFormat::Qr => Box::new(QrReader),
                SymbolFormat::Ean13 => Box::new(Ean13Reader),
            }
        })
        .collect()
}

/// QR codes via rqrr
#[derive(Debug, Default, Clone, Copy)]
pub struct QrReader;

impl SymbolReader for QrReader {
    fn format(&self) -> SymbolFormat {
        SymbolFormat::Qr
    }

    fn rotations(&self) -> &[Rotation] {
        &Rotation::ALL
    }

    fn read(&self, bitmap: &Bitmap) -> Recognition {
        let mut prepared =
            PreparedImage::prepare_from_bitmap(bitmap.width(), bitmap.height(), |x, y| {
                bitmap.is_dark(x, y)
            });

        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => return Recognition::Found(content),
                Err(e) if is_fault(&e) => {
                    return Recognition::Fault(DecodeFault {
                        format: SymbolFormat::Qr,
                        message: e.to_string(),
                    })
                }
                // damaged or misread grid: keep looking
                Err(_) => continue,
            }
        }
        Recognition::NotFound
    }
}

/// Grid ECC/format failures mean "not this time"; these mean the payload itself is unusable.
fn is_fault(err: &DeQRError) -> bool {
    matches!(err, DeQRError::IoError | DeQRError::EncodingError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_bitmap_is_not_found() {
        let bitmap = Bitmap::from_fn(64, 64, |_, _| false);
        assert!(matches!(QrReader.read(&bitmap), Recognition::NotFound));
    }

    #[test]
    fn readers_follow_configured_order() {
        let readers = readers_for(&[SymbolFormat::Ean13, SymbolFormat::Qr]);
        let formats: Vec<_> = readers.iter().map(|r| r.format()).collect();
        assert_eq!(formats, vec![SymbolFormat::Ean13, SymbolFormat::Qr]);
        assert_eq!(readers[1].rotations().len(), 4);
        assert!(!readers[0].rotations().contains(&Rotation::Deg270));
    }
}
