pub mod payload;
pub mod render;

pub use payload::{Payload, StreamContent};
pub use render::PayloadRenderer;
