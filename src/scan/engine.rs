//! First-match symbol search over the transform plan.

use std::cell::OnceCell;

use serde::Serialize;
use tracing::{debug, instrument, trace};

use super::image::PixelImage;
use super::plan::{Attempt, Polarity, SearchPlan};
use super::reader::{readers_for, DecodeFault, Recognition, SymbolFormat, SymbolReader};
use super::transform::{contrast_stretch, crop_center_band, invert_luma, luminance, rotate, scale, sharpen};
use crate::ScanConfig;

/// A recognized payload and the transform combination that produced it
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub format: SymbolFormat,
    pub text: String,
    pub attempt: Attempt,
}

pub struct DecodeEngine {
    plan: SearchPlan,
    readers: Vec<Box<dyn SymbolReader>>,
}

impl DecodeEngine {
    pub fn new(plan: SearchPlan, readers: Vec<Box<dyn SymbolReader>>) -> Self {
        Self { plan, readers }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(SearchPlan::from_config(config), readers_for(&config.formats))
    }

    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    /// Walk the plan in order and stop at the first reader that recognizes a
    /// symbol. `Ok(None)` means every combination missed; only a reader fault
    /// is an error, and it ends the search on the spot.
    ///
    /// Intermediates are built once per nesting level: the scaled image is
    /// shared by every region, the crop by every rotation, and the sharpened
    /// luminance by every binarizer/polarity pair.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn decode(&self, image: &PixelImage) -> Result<Option<Symbol>, DecodeFault> {
        if image.width() == 0 || image.height() == 0 || self.readers.is_empty() {
            return Ok(None);
        }

        let mut attempts = 0usize;
        for &factor in &self.plan.scales {
            let scaled = scale(image, factor);
            for &region in &self.plan.regions {
                let cropped = crop_center_band(&scaled, region);
                for &rotation in &self.plan.rotations {
                    let readers: Vec<&dyn SymbolReader> = self
                        .readers
                        .iter()
                        .map(|r| r.as_ref())
                        .filter(|r| r.rotations().contains(&rotation))
                        .collect();
                    if readers.is_empty() {
                        continue;
                    }

                    let rotated = rotate(&cropped, rotation);
                    let luma = luminance(&rotated);
                    let enhanced = sharpen(&contrast_stretch(&luma));
                    let inverted = OnceCell::new();

                    for &binarizer in &self.plan.binarizers {
                        for &polarity in &self.plan.polarities {
                            let source = match polarity {
                                Polarity::Normal => &enhanced,
                                Polarity::Inverted => inverted.get_or_init(|| invert_luma(&enhanced)),
                            };
                            let bitmap = binarizer.apply(source);
                            let attempt = Attempt {
                                scale: factor,
                                region,
                                rotation,
                                binarizer,
                                polarity,
                            };

                            for reader in &readers {
                                attempts += 1;
                                match reader.read(&bitmap) {
                                    Recognition::Found(text) => {
                                        debug!(?attempt, attempts, "{} symbol found", reader.format());
                                        return Ok(Some(Symbol {
                                            format: reader.format(),
                                            text,
                                            attempt,
                                        }));
                                    }
                                    Recognition::NotFound => {
                                        trace!(?attempt, "{} miss", reader.format());
                                    }
                                    Recognition::Fault(fault) => {
                                        debug!(?attempt, attempts, "search aborted: {}", fault);
                                        return Err(fault);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        debug!(attempts, "no symbol found");
        Ok(None)
    }
}
