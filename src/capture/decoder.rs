use thiserror::Error;

use super::frame::Frame;
use crate::scan::image::PixelImage;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame {sequence} is not a decodable image: {source}")]
    Image {
        sequence: u64,
        #[source]
        source: image::ImageError,
    },
    #[error("frame {sequence} decoded to an empty image")]
    Empty { sequence: u64 },
}

/// Decode an encoded snapshot (JPEG, PNG) into row-major RGBA8 pixels.
pub fn decode_frame(frame: &Frame) -> Result<PixelImage, DecodeError> {
    decode_bytes(&frame.data).map_err(|e| match e {
        Some(source) => DecodeError::Image {
            sequence: frame.sequence(),
            source,
        },
        None => DecodeError::Empty {
            sequence: frame.sequence(),
        },
    })
}

fn decode_bytes(data: &[u8]) -> Result<PixelImage, Option<image::ImageError>> {
    let rgba = image::load_from_memory(data).map_err(Some)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(None);
    }
    Ok(PixelImage::from_rgba(width as usize, height as usize, rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::time::Duration;

    fn encode_png(width: u32, height: u32) -> Bytes {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 10) as u8, (y * 10) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    #[test]
    fn decodes_png_into_rgba() {
        let frame = Frame::new(1, encode_png(6, 4), None, Duration::ZERO);
        let image = decode_frame(&frame).unwrap();
        assert_eq!((image.width(), image.height()), (6, 4));
        assert_eq!(image.pixel(2, 3), [20, 30, 128, 255]);
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let frame = Frame::new(7, Bytes::from_static(b"\xff\xd8not really a jpeg"), None, Duration::ZERO);
        match decode_frame(&frame) {
            Err(DecodeError::Image { sequence, .. }) => assert_eq!(sequence, 7),
            other => panic!("expected image error, got {:?}", other.map(|i| i.width())),
        }
    }
}
