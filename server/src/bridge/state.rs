use crate::stream::SessionTimings;
use sandcore::detection::{CircleDetector, DetectionConfigStore};
use sandcore::device::DepthCamera;
use sandcore::stream::PayloadRenderer;
use sandcore::telemetry::StreamMetrics;
use std::sync::Arc;
use std::time::Duration;

/// Everything a route handler or stream session needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub renderer: PayloadRenderer,
    pub store: Arc<DetectionConfigStore>,
    pub metrics: Arc<StreamMetrics>,
    pub default_interval: Duration,
    pub timings: SessionTimings,
}

impl AppState {
    pub fn new(
        camera: Arc<dyn DepthCamera>,
        detector: CircleDetector,
        quality: u8,
        default_interval: Duration,
    ) -> Self {
        let store = Arc::new(DetectionConfigStore::default());
        Self {
            renderer: PayloadRenderer::new(camera, detector, store.clone(), quality),
            store,
            metrics: Arc::new(StreamMetrics::default()),
            default_interval,
            timings: SessionTimings::default(),
        }
    }

    #[cfg(test)]
    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.timings = timings;
        self
    }
}
