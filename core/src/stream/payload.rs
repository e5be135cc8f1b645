use crate::device::FrameKind;
use crate::prelude::{Circle, SandResult};
use serde::{Deserialize, Serialize};

/// Unit sent to a streaming client on every render tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Base64 depth samples; omitted for image-only content.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,
    #[serde(rename = "c", default)]
    pub circles: Vec<Circle>,
}

/// What a session renders on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamContent {
    /// Depth array plus, when enabled, depth-joined circles.
    Payload { detection: bool },
    /// Base64 JPEG of a single image stream.
    Frame(FrameKind),
}

impl StreamContent {
    /// Resolves the optional kind segment of a stream request.
    pub fn parse(kind: Option<&str>, detection: bool) -> SandResult<Self> {
        match kind {
            None | Some("deptharray") | Some("data") => Ok(StreamContent::Payload { detection }),
            Some(other) => other.parse().map(StreamContent::Frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_shape() {
        let payload = Payload {
            depth: Some("AAA=".into()),
            circles: vec![Circle {
                x: 1,
                y: 2,
                r: 3,
                z: 4,
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"d": "AAA=", "c": [{"x": 1, "y": 2, "r": 3, "z": 4}]})
        );

        let bare = Payload {
            depth: None,
            circles: Vec::new(),
        };
        assert_eq!(serde_json::to_string(&bare).unwrap(), r#"{"c":[]}"#);
    }

    #[test]
    fn stream_content_from_request() {
        assert_eq!(
            StreamContent::parse(None, true).unwrap(),
            StreamContent::Payload { detection: true }
        );
        assert_eq!(
            StreamContent::parse(Some("rgbframe"), false).unwrap(),
            StreamContent::Frame(FrameKind::Color)
        );
        assert!(StreamContent::parse(Some("sonar"), false).is_err());
    }
}
