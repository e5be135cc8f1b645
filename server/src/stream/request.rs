use sandcore::prelude::SandResult;
use sandcore::stream::StreamContent;
use serde::Deserialize;
use std::time::Duration;

/// Query string accepted by the stream and data routes.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub detection: Option<String>,
}

impl StreamQuery {
    pub fn detection_enabled(&self) -> bool {
        self.detection.as_deref().map(truthy).unwrap_or(false)
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on"
    )
}

/// What a client asked for when opening a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamRequest {
    pub content: StreamContent,
    pub interval: Duration,
}

impl StreamRequest {
    /// Parses the path after `/stream/`: `{time}` or `{kind}/{time}`.
    ///
    /// A missing, non-numeric, or zero interval falls back to `default_interval`.
    pub fn from_path(tail: &str, detection: bool, default_interval: Duration) -> SandResult<Self> {
        let segments = tail
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();

        let (kind, time) = match segments.as_slice() {
            [] => (None, None),
            [only] if only.parse::<u64>().is_err() && is_kind(only) => (Some(*only), None),
            [only] => (None, Some(*only)),
            [kind, time, ..] => (Some(*kind), Some(*time)),
        };

        let content = StreamContent::parse(kind, detection)?;
        let interval = time
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default_interval);

        Ok(Self { content, interval })
    }
}

fn is_kind(segment: &str) -> bool {
    StreamContent::parse(Some(segment), false).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandcore::device::FrameKind;

    const DEFAULT: Duration = Duration::from_millis(200);

    #[test]
    fn interval_only_path() {
        let request = StreamRequest::from_path("100/", false, DEFAULT).unwrap();
        assert_eq!(request.interval, Duration::from_millis(100));
        assert_eq!(request.content, StreamContent::Payload { detection: false });
    }

    #[test]
    fn invalid_or_missing_interval_uses_default() {
        for tail in ["", "soon/", "0", "-5/"] {
            let request = StreamRequest::from_path(tail, true, DEFAULT).unwrap();
            assert_eq!(request.interval, DEFAULT, "tail {tail:?}");
            assert_eq!(request.content, StreamContent::Payload { detection: true });
        }
    }

    #[test]
    fn kind_and_interval_path() {
        let request = StreamRequest::from_path("irframe/50/", false, DEFAULT).unwrap();
        assert_eq!(request.content, StreamContent::Frame(FrameKind::Infrared));
        assert_eq!(request.interval, Duration::from_millis(50));

        let request = StreamRequest::from_path("rgbframe", false, DEFAULT).unwrap();
        assert_eq!(request.content, StreamContent::Frame(FrameKind::Color));
        assert_eq!(request.interval, DEFAULT);

        assert!(StreamRequest::from_path("sonar/50", false, DEFAULT).is_err());
    }

    #[test]
    fn detection_flag_is_boolean_ish() {
        for (raw, expected) in [("true", true), ("1", true), ("", true), ("no", false)] {
            let query = StreamQuery {
                detection: Some(raw.to_string()),
            };
            assert_eq!(query.detection_enabled(), expected, "{raw:?}");
        }
        assert!(!StreamQuery::default().detection_enabled());
    }
}
