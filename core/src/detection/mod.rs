//! Circle detection: tuning values, the shared tuning store, the
//! circle-finding primitive, and the detector that ties them to the camera.

pub mod config;
pub mod detector;
pub mod primitive;
pub mod store;

pub use config::{DetectionConfig, DetectionSettings};
pub use detector::{join_depth, CircleDetector, Detection};
pub use primitive::{CirclePrimitive, HoughGradient};
pub use store::DetectionConfigStore;
