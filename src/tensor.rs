//! Normalized image tensors handed to the host pipeline.

use crate::capture::RawFrame;
use chrono::{DateTime, Utc};
use ndarray::{Array4, ArrayView3, Axis};
use thiserror::Error;

/// Errors converting a raw frame into a tensor.
#[derive(Debug, Error)]
pub enum TensorError {
    /// Buffer length does not match the frame dimensions.
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BufferSize {
        /// Bytes a `width`×`height` RGB frame needs.
        expected: usize,
        /// Bytes the frame holds.
        actual: usize,
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
    },
    /// The pixel buffer could not be shaped into a tensor.
    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A batch of one RGB image with samples in `[0, 1]`.
///
/// Layout is `(batch, height, width, channel)` with a batch size of 1.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Array4<f32>,
    captured_at: DateTime<Utc>,
}

impl ImageTensor {
    /// Converts a raw 8-bit frame to RGB and scales every sample by 1/255.
    pub fn from_frame(frame: RawFrame) -> Result<Self, TensorError> {
        if !frame.is_valid() {
            return Err(TensorError::BufferSize {
                expected: frame.pixel_count() * RawFrame::CHANNELS,
                actual: frame.pixels().len(),
                width: frame.width(),
                height: frame.height(),
            });
        }

        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let captured_at = frame.captured_at();
        let samples: Vec<f32> = frame
            .into_rgb()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect();

        let data = Array4::from_shape_vec((1, height, width, RawFrame::CHANNELS), samples)?;
        Ok(Self { data, captured_at })
    }

    /// Returns `[batch, height, width, channels]`.
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.data.shape()[2]
    }

    /// Returns the single image as an `(height, width, channel)` view.
    pub fn image(&self) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }

    /// Sample at row `y`, column `x`, channel `c`.
    pub fn get(&self, y: usize, x: usize, c: usize) -> Option<f32> {
        self.data.get((0, y, x, c)).copied()
    }

    /// Mean value of each RGB channel.
    pub fn channel_means(&self) -> [f32; 3] {
        let mut means = [0.0; 3];
        for (c, mean) in means.iter_mut().enumerate() {
            *mean = self
                .data
                .index_axis(Axis(3), c)
                .mean()
                .unwrap_or(0.0);
        }
        means
    }

    /// Capture timestamp of the source frame.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Borrows the underlying array.
    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Consumes the tensor, returning the underlying array.
    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ChannelOrder;
    use proptest::prelude::*;

    #[test]
    fn test_shape_has_batch_dimension() {
        let frame = RawFrame::new(vec![0; 4 * 2 * 3], 4, 2, ChannelOrder::Rgb);
        let tensor = ImageTensor::from_frame(frame).unwrap();

        assert_eq!(tensor.shape(), [1, 2, 4, 3]);
        assert_eq!(tensor.height(), 2);
        assert_eq!(tensor.width(), 4);
        assert_eq!(tensor.image().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_extremes_normalize_exactly() {
        let frame = RawFrame::new(vec![255, 0, 255, 0, 255, 0], 2, 1, ChannelOrder::Rgb);
        let tensor = ImageTensor::from_frame(frame).unwrap();

        assert_eq!(tensor.get(0, 0, 0), Some(1.0));
        assert_eq!(tensor.get(0, 0, 1), Some(0.0));
        assert_eq!(tensor.get(0, 1, 1), Some(1.0));
        assert_eq!(tensor.get(0, 2, 0), None);
    }

    #[test]
    fn test_bgr_frames_become_rgb() {
        let frame = RawFrame::new(vec![0, 0, 255], 1, 1, ChannelOrder::Bgr);
        let tensor = ImageTensor::from_frame(frame).unwrap();

        assert_eq!(tensor.get(0, 0, 0), Some(1.0));
        assert_eq!(tensor.get(0, 0, 2), Some(0.0));
    }

    #[test]
    fn test_channel_means() {
        let frame = RawFrame::new(vec![255, 0, 0, 255, 0, 0], 2, 1, ChannelOrder::Rgb);
        let tensor = ImageTensor::from_frame(frame).unwrap();

        assert_eq!(tensor.channel_means(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_malformed_buffer_rejected() {
        let frame = RawFrame::new(vec![0; 5], 2, 1, ChannelOrder::Rgb);
        assert!(matches!(
            ImageTensor::from_frame(frame),
            Err(TensorError::BufferSize { expected: 6, actual: 5, .. })
        ));
    }

    proptest! {
        #[test]
        fn test_samples_stay_in_unit_range(pixel in prop::array::uniform3(any::<u8>())) {
            let frame = RawFrame::new(pixel.to_vec(), 1, 1, ChannelOrder::Rgb);
            let tensor = ImageTensor::from_frame(frame).unwrap();

            for (c, &raw) in pixel.iter().enumerate() {
                let v = tensor.get(0, 0, c).unwrap();
                prop_assert!((0.0..=1.0).contains(&v));
                prop_assert!((v - f32::from(raw) / 255.0).abs() < f32::EPSILON);
            }
        }
    }
}
