use crate::codec::{encode_depth_array, encode_image, encode_image_base64};
use crate::detection::{join_depth, CircleDetector, DetectionConfigStore, DetectionSettings};
use crate::device::{DepthCamera, FrameKind};
use crate::prelude::{Circle, SandError, SandResult};
use crate::stream::payload::{Payload, StreamContent};
use std::sync::Arc;

/// Captures from the camera and turns the result into transport-ready bytes.
///
/// Shared by every streaming session and the request/response routes. All
/// methods block on the camera and should run off the async workers.
#[derive(Clone)]
pub struct PayloadRenderer {
    camera: Arc<dyn DepthCamera>,
    detector: CircleDetector,
    store: Arc<DetectionConfigStore>,
    quality: u8,
}

impl PayloadRenderer {
    pub fn new(
        camera: Arc<dyn DepthCamera>,
        detector: CircleDetector,
        store: Arc<DetectionConfigStore>,
        quality: u8,
    ) -> Self {
        Self {
            camera,
            detector,
            store,
            quality,
        }
    }

    pub fn camera(&self) -> &dyn DepthCamera {
        self.camera.as_ref()
    }

    pub fn store(&self) -> &DetectionConfigStore {
        &self.store
    }

    /// Depth array plus, when requested, circles joined with their depth.
    pub fn payload(&self, detection: bool) -> SandResult<Payload> {
        let depth = self.camera.depth_array()?;
        let circles = if detection {
            let settings = self.store.get();
            let found = self.detector.detect_circles(self.camera.as_ref(), &settings);
            join_depth(&found, &depth)?
        } else {
            Vec::new()
        };
        Ok(Payload {
            depth: Some(encode_depth_array(&depth)),
            circles,
        })
    }

    /// Bytes for one stream tick.
    pub fn render(&self, content: &StreamContent) -> SandResult<Vec<u8>> {
        match content {
            StreamContent::Payload { detection } => serde_json::to_vec(&self.payload(*detection)?)
                .map_err(|err| SandError::Encode(err.to_string())),
            StreamContent::Frame(kind) => {
                let frame = self.camera.frame(*kind)?;
                Ok(encode_image_base64(&frame, self.quality)?.into_bytes())
            }
        }
    }

    pub fn jpeg(&self, kind: FrameKind) -> SandResult<Vec<u8>> {
        encode_image(&self.camera.frame(kind)?, self.quality)
    }

    pub fn depth_text(&self) -> SandResult<String> {
        Ok(encode_depth_array(&self.camera.depth_array()?))
    }

    /// Circles in image space, without depth.
    pub fn circles(&self, settings: &DetectionSettings) -> Vec<Circle> {
        self.detector
            .detect_circles(self.camera.as_ref(), settings)
            .circles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_depth_array;
    use crate::detection::{CirclePrimitive, DetectionConfig};
    use crate::device::{SyntheticCamera, SyntheticConfig};
    use image::GrayImage;

    struct Fixed(Vec<Vec<f32>>);

    impl CirclePrimitive for Fixed {
        fn find_circles(&self, _gray: &GrayImage, _config: &DetectionConfig) -> Vec<Vec<f32>> {
            self.0.clone()
        }
    }

    fn renderer(answer: Vec<Vec<f32>>) -> (Arc<SyntheticCamera>, PayloadRenderer) {
        let camera = Arc::new(SyntheticCamera::new(SyntheticConfig {
            width: 32,
            height: 24,
            seed: 4,
            noise: 0.0,
            ..Default::default()
        }));
        let renderer = PayloadRenderer::new(
            camera.clone(),
            CircleDetector::new(Arc::new(Fixed(answer))),
            Arc::new(DetectionConfigStore::default()),
            90,
        );
        (camera, renderer)
    }

    #[test]
    fn payload_without_detection_has_empty_circles() {
        let (_, renderer) = renderer(vec![vec![5.0, 5.0, 2.0]]);
        let bytes = renderer
            .render(&StreamContent::Payload { detection: false })
            .unwrap();
        let payload: Payload = serde_json::from_slice(&bytes).unwrap();
        assert!(payload.circles.is_empty());
        let depth = decode_depth_array(&payload.depth.unwrap(), 32, 24).unwrap();
        assert_eq!(depth.samples().len(), 32 * 24);
    }

    #[test]
    fn payload_with_detection_joins_depth() {
        let (camera, renderer) = renderer(vec![vec![5.0, 6.0, 2.0]]);
        let payload = renderer.payload(true).unwrap();
        let expected = camera.depth_array().unwrap().get(5 * 24 + 6).unwrap() as i32;
        assert_eq!(payload.circles, vec![Circle { x: 5, y: 6, r: 2, z: expected }]);
    }

    #[test]
    fn out_of_frame_circle_fails_the_tick() {
        let (_, renderer) = renderer(vec![vec![5.0, 40.0, 2.0]]);
        assert!(matches!(renderer.payload(true), Err(SandError::Capture(_))));
    }

    #[test]
    fn frame_content_is_base64_jpeg_text() {
        let (_, renderer) = renderer(Vec::new());
        let bytes = renderer
            .render(&StreamContent::Frame(FrameKind::Infrared))
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("/9j/"), "JPEG magic in base64: {text:.8}");
    }
}
