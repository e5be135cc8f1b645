use crate::device::Frame;
use crate::prelude::{SandError, SandResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};

/// Lossy-compresses a captured frame to JPEG at the given quality (1..=100).
pub fn encode_image(frame: &Frame, quality: u8) -> SandResult<Vec<u8>> {
    let image = frame.to_image().ok_or_else(|| {
        SandError::Encode(format!(
            "{}x{} {:?} frame carries {} bytes, expected {}",
            frame.width,
            frame.height,
            frame.format,
            frame.data.len(),
            frame.expected_len()
        ))
    })?;

    let quality = quality.clamp(1, 100);
    let mut buffer = Vec::new();
    let encoded = match image {
        DynamicImage::ImageLuma8(gray) => {
            JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&gray)
        }
        other => JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&other.to_rgb8()),
    };
    encoded.map_err(|err| SandError::Encode(format!("JPEG encode failed: {err}")))?;
    Ok(buffer)
}

/// JPEG-encodes a frame and wraps it as base64 text for text-only transports.
pub fn encode_image_base64(frame: &Frame, quality: u8) -> SandResult<String> {
    encode_image(frame, quality).map(|jpeg| STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PixelFormat;

    #[test]
    fn encodes_rgba_frames_as_jpeg() {
        let frame = Frame::new(8, 8, PixelFormat::Rgba8, vec![200; 8 * 8 * 4]);
        let jpeg = encode_image(&frame, 100).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn malformed_buffer_is_an_encode_error() {
        let frame = Frame::new(8, 8, PixelFormat::Gray8, vec![0; 10]);
        assert!(matches!(encode_image(&frame, 90), Err(SandError::Encode(_))));
    }

    #[test]
    fn base64_output_decodes_to_jpeg() {
        let frame = Frame::new(4, 4, PixelFormat::Gray8, vec![128; 16]);
        let text = encode_image_base64(&frame, 0).unwrap();
        let bytes = STANDARD.decode(text).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
