use crate::detection::config::DetectionSettings;
use crate::detection::primitive::{CirclePrimitive, HoughGradient};
use crate::device::{DepthArray, DepthCamera};
use crate::prelude::{Circle, SandError, SandResult};
use image::RgbaImage;
use imageproc::filter::median_filter;
use log::{debug, warn};
use std::sync::Arc;

/// Median kernel is 5x5.
const MEDIAN_RADIUS: u32 = 2;

/// Circles found in one color frame, with that frame's geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub circles: Vec<Circle>,
    pub width: u32,
    pub height: u32,
}

/// Runs the blur → grayscale → primitive pass over the camera's color frame.
#[derive(Clone)]
pub struct CircleDetector {
    primitive: Arc<dyn CirclePrimitive>,
}

impl CircleDetector {
    pub fn new(primitive: Arc<dyn CirclePrimitive>) -> Self {
        Self { primitive }
    }

    /// Detector backed by the built-in Hough-gradient primitive.
    pub fn hough() -> Self {
        Self::new(Arc::new(HoughGradient))
    }

    /// Captures a color frame and locates circles in it. Capture failures are
    /// logged and produce an empty detection.
    pub fn detect_circles(
        &self,
        camera: &dyn DepthCamera,
        settings: &DetectionSettings,
    ) -> Detection {
        match self.capture_and_detect(camera, settings) {
            Ok(detection) => detection,
            Err(err) => {
                warn!("circle detection skipped: {}", err);
                Detection::default()
            }
        }
    }

    fn capture_and_detect(
        &self,
        camera: &dyn DepthCamera,
        settings: &DetectionSettings,
    ) -> SandResult<Detection> {
        let frame = camera.color_frame()?;
        let image = frame.to_image().ok_or_else(|| {
            SandError::Capture(format!(
                "color frame carries {} bytes, expected {}",
                frame.data.len(),
                frame.expected_len()
            ))
        })?;
        Ok(self.detect_in_image(&image.to_rgba8(), settings))
    }

    pub fn detect_in_image(&self, rgba: &RgbaImage, settings: &DetectionSettings) -> Detection {
        let blurred = median_filter(rgba, MEDIAN_RADIUS, MEDIAN_RADIUS);
        let gray = image::imageops::grayscale(&blurred);
        let config = settings.resolve(gray.height());

        let circles = self
            .primitive
            .find_circles(&gray, &config)
            .into_iter()
            .filter(|entry| entry.len() >= 3)
            .map(|entry| Circle::new(entry[0] as i32, entry[1] as i32, entry[2] as i32))
            .collect::<Vec<_>>();
        debug!("{} circles with {:?}", circles.len(), config);

        Detection {
            circles,
            width: gray.width(),
            height: gray.height(),
        }
    }
}

/// Annotates each circle with the depth sample at `x * height + y`.
///
/// `height` is the captured frame height. A detection whose frame geometry
/// differs from the depth array, or a centre outside it, is a capture error.
pub fn join_depth(detection: &Detection, depth: &DepthArray) -> SandResult<Vec<Circle>> {
    if detection.circles.is_empty() {
        return Ok(Vec::new());
    }
    if (detection.width, detection.height) != (depth.width(), depth.height()) {
        return Err(SandError::Capture(format!(
            "color frame {}x{} does not match depth array {}x{}",
            detection.width,
            detection.height,
            depth.width(),
            depth.height()
        )));
    }

    let height = depth.height() as usize;
    detection
        .circles
        .iter()
        .map(|circle| -> SandResult<Circle> {
            let sample = usize::try_from(circle.x)
                .ok()
                .zip(usize::try_from(circle.y).ok())
                .filter(|&(_, y)| y < height)
                .and_then(|(x, y)| depth.get(x * height + y))
                .ok_or_else(|| {
                    SandError::Capture(format!(
                        "circle centre ({}, {}) outside depth array",
                        circle.x, circle.y
                    ))
                })?;
            Ok(Circle {
                z: sample as i32,
                ..*circle
            })
        })
        .collect()
}
