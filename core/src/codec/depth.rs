use crate::device::DepthArray;
use crate::prelude::{SandError, SandResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Base64 text of the little-endian depth samples.
pub fn encode_depth_array(depth: &DepthArray) -> String {
    STANDARD.encode(depth.to_le_bytes())
}

pub fn decode_depth_array(text: &str, width: u32, height: u32) -> SandResult<DepthArray> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|err| SandError::Encode(format!("depth array is not base64: {err}")))?;
    if bytes.len() % 2 != 0 {
        return Err(SandError::Encode(format!(
            "depth array has odd byte length {}",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    DepthArray::new(width, height, samples).map_err(|err| SandError::Encode(err.to_string()))
}
