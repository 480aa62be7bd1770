pub mod decoder;
pub mod fetch;
pub mod frame;

pub use decoder::{decode_frame, DecodeError};
pub use fetch::{FetchError, FrameSource, HttpFetcher};
pub use frame::{Frame, FrameMetadata};
