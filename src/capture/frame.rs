//! Raw frame type as delivered by a camera device.

use chrono::{DateTime, Utc};

/// Byte order of the three color channels in a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Red, green, blue.
    Rgb,
    /// Blue, green, red (the native order of many capture drivers).
    Bgr,
}

/// A single 8-bit, three-channel frame read from a device.
///
/// Pixels are stored row-major, interleaved, in the device's native
/// channel order. Conversion to RGB happens when the frame is turned
/// into a tensor.
#[derive(Clone)]
pub struct RawFrame {
    /// Interleaved pixel data, `width * height * 3` bytes.
    pixels: Vec<u8>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Channel order of `pixels`.
    order: ChannelOrder,
    /// Wall-clock capture time.
    captured_at: DateTime<Utc>,
}

impl RawFrame {
    /// Number of interleaved channels per pixel.
    pub const CHANNELS: usize = 3;

    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, order: ChannelOrder) -> Self {
        Self {
            pixels,
            width,
            height,
            order,
            captured_at: Utc::now(),
        }
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the native channel order.
    #[inline]
    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count() * Self::CHANNELS
    }

    /// Consumes the frame, returning its pixels in RGB order.
    pub fn into_rgb(self) -> Vec<u8> {
        let mut pixels = self.pixels;
        if self.order == ChannelOrder::Bgr {
            for px in pixels.chunks_exact_mut(Self::CHANNELS) {
                px.swap(0, 2);
            }
        }
        pixels
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("captured_at", &self.captured_at)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}
