pub mod display;

pub use display::{DisplayConsumer, DisplayFrame, FpsMeter};
