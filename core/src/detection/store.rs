use crate::detection::config::DetectionSettings;
use crate::prelude::SandResult;
use log::info;
use std::sync::{Arc, PoisonError, RwLock};

/// Process-wide detection tuning, shared by handle with every session.
///
/// Writers swap the whole value; readers clone the current `Arc`, so a reader
/// never sees a partially applied update.
#[derive(Debug, Default)]
pub struct DetectionConfigStore {
    current: RwLock<Arc<DetectionSettings>>,
}

impl DetectionConfigStore {
    pub fn new(settings: DetectionSettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn get(&self) -> Arc<DetectionSettings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, settings: DetectionSettings) {
        let next = Arc::new(settings);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Parses a control body and installs it; the previous value stays in
    /// place when parsing fails.
    pub fn apply_json(&self, body: &[u8]) -> SandResult<DetectionSettings> {
        let settings = DetectionSettings::parse(body)?;
        self.set(settings);
        info!("detection settings replaced: {:?}", settings);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::config::DetectionConfig;
    use std::thread;

    fn custom(seed: i32) -> DetectionSettings {
        DetectionSettings::Custom(DetectionConfig {
            dp: seed as f64,
            min_dist: seed as f64 * 10.0,
            param1: seed as f64 * 100.0,
            param2: seed as f64 * 1000.0,
            min_radius: seed,
            max_radius: seed * 2,
        })
    }

    #[test]
    fn failed_parse_keeps_previous_settings() {
        let store = DetectionConfigStore::new(custom(3));
        assert!(store.apply_json(b"{broken").is_err());
        assert_eq!(*store.get(), custom(3));

        store
            .apply_json(br#"{"dp":2,"mindist":30,"param1":50,"param2":25,"min":5,"max":60}"#)
            .unwrap();
        assert_eq!(store.get().custom().unwrap().min_dist, 30.0);
    }

    #[test]
    fn readers_never_observe_mixed_values() {
        let store = Arc::new(DetectionConfigStore::default());
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for round in 0..2_000 {
                    store.set(custom(1 + round % 2));
                }
            })
        };
        let readers = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let seen = *store.get();
                        assert!(
                            seen == DetectionSettings::UseDefaults
                                || seen == custom(1)
                                || seen == custom(2),
                            "torn read: {seen:?}"
                        );
                    }
                })
            })
            .collect::<Vec<_>>();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
