pub mod depth;
pub mod frame;

pub use self::depth::{decode_depth_array, encode_depth_array};
pub use self::frame::{encode_image, encode_image_base64};
