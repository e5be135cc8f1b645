use serde::{Deserialize, Serialize};

/// Fixed frame geometry of the depth sensor.
pub const DEVICE_WIDTH: u32 = 640;
pub const DEVICE_HEIGHT: u32 = 480;

/// Default JPEG quality for encoded frames.
pub const DEFAULT_IMAGE_QUALITY: u8 = 100;

/// A circle located in image space, optionally joined with a depth sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circle {
    pub x: i32,
    pub y: i32,
    pub r: i32,
    #[serde(default)]
    pub z: i32,
}

impl Circle {
    pub fn new(x: i32, y: i32, r: i32) -> Self {
        Self { x, y, r, z: 0 }
    }
}

/// Common error type shared by capture, encoding, configuration, and streaming.
#[derive(thiserror::Error, Debug)]
pub enum SandError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("invalid detection config: {0}")]
    ConfigParse(String),
    #[error("connection error: {0}")]
    Connection(String),
}

pub type SandResult<T> = Result<T, SandError>;
