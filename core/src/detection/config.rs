use crate::prelude::{SandError, SandResult};
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};

const DEFAULT_DP: f64 = 1.0;
const DEFAULT_PARAM1: f64 = 75.0;
const DEFAULT_PARAM2: f64 = 20.0;
const DEFAULT_MIN_RADIUS: i32 = 1;
const DEFAULT_MAX_RADIUS: i32 = 0;
/// Largest radius a client may ask for.
pub const RADIUS_LIMIT: i32 = 4096;

/// Hough tuning values as posted by clients.
///
/// Every field is optional on the wire and accepts either a JSON number or a
/// numeric string; missing fields are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    #[serde(deserialize_with = "lenient_f64")]
    pub dp: f64,
    #[serde(rename = "mindist", deserialize_with = "lenient_f64")]
    pub min_dist: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub param1: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub param2: f64,
    #[serde(rename = "min", deserialize_with = "lenient_i32")]
    pub min_radius: i32,
    #[serde(rename = "max", deserialize_with = "lenient_i32")]
    pub max_radius: i32,
}

impl DetectionConfig {
    /// Defaults derived from the row count of the frame being analysed.
    pub fn defaults_for_rows(rows: u32) -> Self {
        Self {
            dp: DEFAULT_DP,
            min_dist: (rows / 8) as f64,
            param1: DEFAULT_PARAM1,
            param2: DEFAULT_PARAM2,
            min_radius: DEFAULT_MIN_RADIUS,
            max_radius: DEFAULT_MAX_RADIUS,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    fn validate(self) -> SandResult<Self> {
        if self.is_zero() {
            return Ok(self);
        }
        if !(self.dp >= 1.0) || !self.dp.is_finite() {
            return Err(SandError::ConfigParse(format!(
                "dp must be at least 1, got {}",
                self.dp
            )));
        }
        if !(self.min_dist >= 0.0) || !self.min_dist.is_finite() {
            return Err(SandError::ConfigParse(format!(
                "mindist must be non-negative, got {}",
                self.min_dist
            )));
        }
        if !(0..=RADIUS_LIMIT).contains(&self.min_radius) {
            return Err(SandError::ConfigParse(format!(
                "min radius must be within 0..={}, got {}",
                RADIUS_LIMIT, self.min_radius
            )));
        }
        if self.max_radius > RADIUS_LIMIT {
            return Err(SandError::ConfigParse(format!(
                "max radius must be at most {}, got {}",
                RADIUS_LIMIT, self.max_radius
            )));
        }
        Ok(self)
    }
}

/// Tuning in effect for detection passes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DetectionSettings {
    /// Recompute defaults from every frame.
    #[default]
    UseDefaults,
    Custom(DetectionConfig),
}

impl DetectionSettings {
    /// Maps the legacy all-zero config to [`DetectionSettings::UseDefaults`].
    pub fn from_config(config: DetectionConfig) -> Self {
        if config.is_zero() {
            DetectionSettings::UseDefaults
        } else {
            DetectionSettings::Custom(config)
        }
    }

    /// Parses a control request body.
    pub fn parse(body: &[u8]) -> SandResult<Self> {
        let config: DetectionConfig = serde_json::from_slice(body)
            .map_err(|err| SandError::ConfigParse(err.to_string()))?;
        Ok(Self::from_config(config.validate()?))
    }

    pub fn resolve(&self, rows: u32) -> DetectionConfig {
        match self {
            DetectionSettings::UseDefaults => DetectionConfig::defaults_for_rows(rows),
            DetectionSettings::Custom(config) => *config,
        }
    }

    pub fn custom(&self) -> Option<&DetectionConfig> {
        match self {
            DetectionSettings::UseDefaults => None,
            DetectionSettings::Custom(config) => Some(config),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Lenient::deserialize(deserializer)? {
        Lenient::Number(value) => Ok(value),
        Lenient::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("expected a number, got {text:?}"))),
    }
}

fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let value = lenient_f64(deserializer)?;
    if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return Err(D::Error::custom(format!("expected an integer, got {value}")));
    }
    Ok(value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_scale_min_dist_with_rows() {
        let config = DetectionConfig::defaults_for_rows(480);
        assert_eq!(config.min_dist, 60.0);
        assert_eq!(config.param1, 75.0);
        assert_eq!(config.param2, 20.0);
        assert_eq!((config.min_radius, config.max_radius), (1, 0));
        assert_eq!(DetectionConfig::defaults_for_rows(100).min_dist, 12.0);
    }

    #[test]
    fn parses_numeric_body() {
        let body = br#"{"dp":2,"mindist":30,"param1":50,"param2":25,"min":5,"max":60}"#;
        let settings = DetectionSettings::parse(body).unwrap();
        assert_eq!(
            settings,
            DetectionSettings::Custom(DetectionConfig {
                dp: 2.0,
                min_dist: 30.0,
                param1: 50.0,
                param2: 25.0,
                min_radius: 5,
                max_radius: 60,
            })
        );
    }

    #[test]
    fn parses_string_encoded_fields() {
        let body =
            br#"{"dp":"1.5","mindist":"20","param1":"80","param2":"30","min":"3","max":"40"}"#;
        let settings = DetectionSettings::parse(body).unwrap();
        let config = settings.custom().copied().unwrap();
        assert_eq!(config.dp, 1.5);
        assert_eq!(config.max_radius, 40);
    }

    #[test]
    fn zero_config_means_defaults() {
        assert_eq!(
            DetectionSettings::parse(b"{}").unwrap(),
            DetectionSettings::UseDefaults
        );
        let zeros = br#"{"dp":0,"mindist":0,"param1":0,"param2":0,"min":0,"max":0}"#;
        let settings = DetectionSettings::parse(zeros).unwrap();
        assert_eq!(settings.resolve(240), DetectionConfig::defaults_for_rows(240));
    }

    #[test]
    fn rejects_malformed_bodies() {
        for body in [
            &b"not json"[..],
            br#"{"dp":"fast"}"#,
            br#"{"dp":1,"min":2.5}"#,
            br#"{"param1":50}"#,
            br#"{"dp":1,"mindist":-4}"#,
        ] {
            let err = DetectionSettings::parse(body).unwrap_err();
            assert!(matches!(err, SandError::ConfigParse(_)), "{err}");
        }
    }

    #[test]
    fn rejects_tuning_that_would_blow_up_the_accumulator() {
        for body in [
            &br#"{"dp":1,"mindist":10,"param1":75,"param2":20,"min":8,"max":2000000000}"#[..],
            br#"{"dp":0.0001,"mindist":10,"param1":75,"param2":20,"min":8,"max":30}"#,
            br#"{"dp":0.5,"mindist":10,"param1":75,"param2":20,"min":1,"max":0}"#,
            br#"{"dp":1,"mindist":10,"param1":75,"param2":20,"min":5000,"max":0}"#,
        ] {
            let err = DetectionSettings::parse(body).unwrap_err();
            assert!(matches!(err, SandError::ConfigParse(_)), "{err}");
        }
    }
}
