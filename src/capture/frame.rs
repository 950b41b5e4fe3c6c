//! Frame buffers and preview transforms

use crate::recorder::{RecorderError, RecorderResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Packed pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// 3 bytes per pixel, red first
    Rgb24,
    /// 3 bytes per pixel, blue first
    Bgr24,
    /// 4 bytes per pixel, red first, opaque alpha
    Rgba32,
}

impl Default for PixelLayout {
    fn default() -> Self {
        Self::Rgba32
    }
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Rgb24 | PixelLayout::Bgr24 => 3,
            PixelLayout::Rgba32 => 4,
        }
    }

    /// FFmpeg `-pixel_format` name for raw input in this layout
    pub fn ffmpeg_pix_fmt(&self) -> &'static str {
        match self {
            PixelLayout::Rgb24 => "rgb24",
            PixelLayout::Bgr24 => "bgr24",
            PixelLayout::Rgba32 => "rgba",
        }
    }

    /// Read one pixel as (r, g, b, a)
    fn read(&self, px: &[u8]) -> [u8; 4] {
        match self {
            PixelLayout::Rgb24 => [px[0], px[1], px[2], 255],
            PixelLayout::Bgr24 => [px[2], px[1], px[0], 255],
            PixelLayout::Rgba32 => [px[0], px[1], px[2], px[3]],
        }
    }

    /// Append one (r, g, b, a) pixel in this layout
    fn write(&self, rgba: [u8; 4], out: &mut Vec<u8>) {
        match self {
            PixelLayout::Rgb24 => out.extend_from_slice(&rgba[..3]),
            PixelLayout::Bgr24 => out.extend_from_slice(&[rgba[2], rgba[1], rgba[0]]),
            PixelLayout::Rgba32 => out.extend_from_slice(&rgba),
        }
    }
}

/// An immutable pixel buffer captured at a point in time
///
/// Cloning is cheap; the pixel data is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: Arc<[u8]>,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a packed buffer, checking that its size matches the dimensions
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> RecorderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RecorderError::InvalidFrame(format!(
                "zero-sized frame {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * layout.bytes_per_pixel();
        if data.len() != expected {
            return Err(RecorderError::InvalidFrame(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                layout,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data: data.into(),
            captured_at: Instant::now(),
        })
    }

    /// Build a frame filled with one (r, g, b) color
    pub fn solid(width: u32, height: u32, layout: PixelLayout, rgb: [u8; 3]) -> RecorderResult<Self> {
        let mut data = Vec::with_capacity(width as usize * height as usize * layout.bytes_per_pixel());
        for _ in 0..(width as usize * height as usize) {
            layout.write([rgb[0], rgb[1], rgb[2], 255], &mut data);
        }
        Self::new(width, height, layout, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Read the pixel at (x, y) as (r, g, b, a)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.layout.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        Some(self.layout.read(&self.data[offset..offset + bpp]))
    }

    /// Horizontally flipped copy
    pub fn mirrored(&self) -> Frame {
        let bpp = self.layout.bytes_per_pixel();
        let row_len = self.width as usize * bpp;
        let mut out = Vec::with_capacity(self.data.len());

        for row in self.data.chunks_exact(row_len) {
            for px in row.chunks_exact(bpp).rev() {
                out.extend_from_slice(px);
            }
        }

        Frame {
            width: self.width,
            height: self.height,
            layout: self.layout,
            data: out.into(),
            captured_at: self.captured_at,
        }
    }

    /// Copy converted to another channel order
    pub fn to_layout(&self, target: PixelLayout) -> Frame {
        if target == self.layout {
            return self.clone();
        }

        let bpp = self.layout.bytes_per_pixel();
        let mut out =
            Vec::with_capacity(self.width as usize * self.height as usize * target.bytes_per_pixel());
        for px in self.data.chunks_exact(bpp) {
            target.write(self.layout.read(px), &mut out);
        }

        Frame {
            width: self.width,
            height: self.height,
            layout: target,
            data: out.into(),
            captured_at: self.captured_at,
        }
    }
}

/// Build the display copy of a captured frame
///
/// The returned frame never reaches the encoder.
pub fn preview_frame(frame: &Frame, mirror: bool, display_layout: PixelLayout) -> Frame {
    if mirror {
        frame.mirrored().to_layout(display_layout)
    } else {
        frame.to_layout(display_layout)
    }
}
