//! Capture, codec, and circle-detection core for the depth-camera sandbox server.
//!
//! The modules keep the camera behind a trait, turn captured frames into
//! transport-ready payloads, and locate circular markers with a configurable
//! Hough-gradient pass whose tuning is shared by every streaming session.

pub mod codec;
pub mod detection;
pub mod device;
pub mod prelude;
pub mod stream;
pub mod telemetry;

pub use prelude::{SandError, SandResult};
