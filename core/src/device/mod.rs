pub mod camera;
pub mod synthetic;

pub use camera::{indicate, DepthArray, DepthCamera, Frame, FrameKind, LedState, PixelFormat};
pub use synthetic::{SyntheticCamera, SyntheticConfig};
