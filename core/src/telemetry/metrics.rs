use serde::Serialize;
use std::sync::Mutex;

/// Counters shared by every streaming session.
pub struct StreamMetrics {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub payloads_sent: usize,
    pub render_errors: usize,
}

impl MetricsSnapshot {
    pub fn active_sessions(&self) -> usize {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_session_opened(&self) {
        self.update(|metrics| metrics.sessions_opened += 1);
    }

    pub fn record_session_closed(&self) {
        self.update(|metrics| metrics.sessions_closed += 1);
    }

    pub fn record_payload(&self) {
        self.update(|metrics| metrics.payloads_sent += 1);
    }

    pub fn record_render_error(&self) {
        self.update(|metrics| metrics.render_errors += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_active_sessions() {
        let metrics = StreamMetrics::new();
        metrics.record_session_opened();
        metrics.record_session_opened();
        metrics.record_payload();
        metrics.record_session_closed();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_sessions(), 1);
        assert_eq!(snapshot.payloads_sent, 1);
        assert_eq!(snapshot.render_errors, 0);
    }
}
