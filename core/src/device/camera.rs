use crate::prelude::{SandError, SandResult};
use image::{DynamicImage, GrayImage, RgbaImage};
use log::warn;
use ndarray::Array2;
use std::str::FromStr;

/// Pixel layout of a raw frame handed over by the camera driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Raw image buffer captured from the device.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Number of bytes a well-formed buffer of this geometry holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }

    /// Wraps the buffer as an image, or `None` when the buffer does not match
    /// the advertised geometry.
    pub fn to_image(&self) -> Option<DynamicImage> {
        if self.data.len() != self.expected_len() {
            return None;
        }
        match self.format {
            PixelFormat::Gray8 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8),
            PixelFormat::Rgba8 => RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgba8),
        }
    }
}

/// Raw per-pixel depth samples in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthArray {
    width: u32,
    height: u32,
    samples: Vec<u16>,
}

impl DepthArray {
    pub fn new(width: u32, height: u32, samples: Vec<u16>) -> SandResult<Self> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(SandError::Capture(format!(
                "depth array holds {} samples, expected {}x{}",
                samples.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Builds a depth array from a `(rows, cols)` matrix.
    pub fn from_matrix(matrix: Array2<u16>) -> SandResult<Self> {
        let (rows, cols) = matrix.dim();
        let samples = if matrix.is_standard_layout() {
            matrix.into_raw_vec()
        } else {
            matrix.iter().copied().collect()
        };
        Self::new(cols as u32, rows as u32, samples)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.samples.get(index).copied()
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|sample| sample.to_le_bytes())
            .collect()
    }
}

/// Indicator light states supported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    Off,
    Green,
    Red,
    Yellow,
    BlinkGreen,
    BlinkRedYellow,
}

/// Image streams the device can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Depth,
    Infrared,
    Color,
}

impl FromStr for FrameKind {
    type Err = SandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "depth" | "depthframe" => Ok(FrameKind::Depth),
            "ir" | "irframe" => Ok(FrameKind::Infrared),
            "rgb" | "rgbframe" => Ok(FrameKind::Color),
            other => Err(SandError::Capture(format!("unknown frame type {other}"))),
        }
    }
}

/// Camera driver boundary. Implementations must tolerate concurrent capture
/// from several sessions.
pub trait DepthCamera: Send + Sync {
    fn depth_frame(&self) -> SandResult<Frame>;
    fn ir_frame(&self) -> SandResult<Frame>;
    fn color_frame(&self) -> SandResult<Frame>;
    fn depth_array(&self) -> SandResult<DepthArray>;
    fn set_led(&self, state: LedState) -> SandResult<()>;

    fn frame(&self, kind: FrameKind) -> SandResult<Frame> {
        match kind {
            FrameKind::Depth => self.depth_frame(),
            FrameKind::Infrared => self.ir_frame(),
            FrameKind::Color => self.color_frame(),
        }
    }
}

/// Sets the indicator light, logging instead of failing.
pub fn indicate(camera: &dyn DepthCamera, state: LedState) {
    if let Err(err) = camera.set_led(state) {
        warn!("indicator light {:?} not applied: {}", state, err);
    }
}
