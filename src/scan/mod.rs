//! Symbol decoding: pixel transforms, binarization, readers, the first-match
//! search engine and the scheduler that feeds it live frames.

pub mod binarize;
pub mod ean;
pub mod engine;
pub mod image;
pub mod plan;
pub mod reader;
pub mod scheduler;
pub mod transform;

pub use binarize::Binarizer;
pub use engine::{DecodeEngine, Symbol};
pub use image::{Bitmap, LumaImage, PixelImage};
pub use plan::{Attempt, Polarity, SearchPlan};
pub use reader::{DecodeFault, QrReader, Recognition, SymbolFormat, SymbolReader};
pub use scheduler::{ScanGate, ScanPermit, ScanScheduler, ScanState};
pub use transform::Rotation;
