#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use camscan::capture::{FetchError, Frame, FrameSource};
use camscan::scan::ean::encode_modules;
use camscan::scan::PixelImage;
use tokio::sync::Notify;

const BLACK: [u8; 4] = [0, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Upright QR symbol, `module` pixels per module, with a 4-module quiet zone
pub fn qr_image(text: &str, module: usize, inverted: bool) -> PixelImage {
    let code = qrcode::QrCode::new(text.as_bytes()).unwrap();
    let colors = code.to_colors();
    let n = code.width();
    let quiet = 4;
    let size = (n + 2 * quiet) * module;
    PixelImage::from_fn(size, size, |x, y| {
        let (mx, my) = (x / module, y / module);
        let inside = mx >= quiet && my >= quiet && mx < quiet + n && my < quiet + n;
        let dark = inside && colors[(my - quiet) * n + (mx - quiet)] == qrcode::Color::Dark;
        if dark != inverted {
            BLACK
        } else {
            WHITE
        }
    })
}

/// Upright EAN-13 symbol with a 10-module quiet zone
pub fn ean_image(code: &str, module: usize, height: usize) -> PixelImage {
    let modules = encode_modules(code).unwrap();
    let quiet = 10;
    let width = (modules.len() + 2 * quiet) * module;
    PixelImage::from_fn(width, height, |x, _| {
        let m = x / module;
        if m >= quiet && m < quiet + modules.len() && modules[m - quiet] {
            BLACK
        } else {
            WHITE
        }
    })
}

pub fn encode_png(image: &PixelImage) -> Bytes {
    let rgba = image::RgbaImage::from_raw(
        image.width() as u32,
        image.height() as u32,
        image.as_raw().to_vec(),
    )
    .unwrap();
    let mut out = Cursor::new(Vec::new());
    rgba.write_to(&mut out, image::ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

pub fn blank_png() -> Bytes {
    encode_png(&PixelImage::from_fn(32, 24, |_, _| [128, 128, 128, 255]))
}

pub enum Step {
    Frame(Bytes),
    Fail(u16),
    /// Wait for the notify, then yield a frame
    Gated(Arc<Notify>, Bytes),
}

/// Scripted frame source. Once the script runs out it either repeats
/// `repeat` forever or never resolves again.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    repeat: Option<Bytes>,
    sequence: u64,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            repeat: None,
            sequence: 0,
        }
    }

    pub fn repeating(body: Bytes) -> Self {
        Self {
            steps: VecDeque::new(),
            repeat: Some(body),
            sequence: 0,
        }
    }

    fn frame(&mut self, body: Bytes) -> Frame {
        self.sequence += 1;
        Frame::new(self.sequence, body, Some("image/png".into()), Duration::from_millis(1))
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, FetchError>> + Send {
        async move {
            match self.steps.pop_front() {
                Some(Step::Frame(body)) => Ok(self.frame(body)),
                Some(Step::Fail(status)) => Err(FetchError::Status {
                    status,
                    status_text: "Service Unavailable".into(),
                }),
                Some(Step::Gated(gate, body)) => {
                    gate.notified().await;
                    Ok(self.frame(body))
                }
                None => match self.repeat.clone() {
                    Some(body) => {
                        tokio::task::yield_now().await;
                        Ok(self.frame(body))
                    }
                    None => std::future::pending().await,
                },
            }
        }
    }
}
