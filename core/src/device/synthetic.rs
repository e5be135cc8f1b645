use crate::device::camera::{DepthArray, DepthCamera, Frame, LedState, PixelFormat};
use crate::prelude::{SandError, SandResult, DEVICE_HEIGHT, DEVICE_WIDTH};
use log::debug;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Largest value the 11-bit depth sensor reports.
const MAX_DEPTH: u16 = 2047;
const SAND_RGB: [f32; 3] = [194.0, 178.0, 128.0];
const MARKER_RGB: [u8; 3] = [24, 24, 32];

/// Configuration for the procedural sandbox scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub hills: usize,
    pub markers: usize,
    pub noise: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: DEVICE_WIDTH,
            height: DEVICE_HEIGHT,
            seed: 0,
            hills: 4,
            markers: 3,
            noise: 2.0,
        }
    }
}

/// A disc-shaped marker resting on the sand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

struct Hill {
    x: f32,
    y: f32,
    spread: f32,
    height: f32,
}

/// Camera stand-in that renders a seeded sandbox scene with sensor noise.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    terrain: Array2<f32>,
    markers: Vec<Marker>,
    rng: Mutex<StdRng>,
    led: Mutex<LedState>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        let width = config.width.max(1);
        let height = config.height.max(1);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let (w, h) = (width as f32, height as f32);

        let hills = (0..config.hills)
            .map(|_| Hill {
                x: rng.gen_range(0.0..w),
                y: rng.gen_range(0.0..h),
                spread: rng.gen_range(0.08..0.25) * w.max(h),
                height: rng.gen_range(80.0..260.0),
            })
            .collect::<Vec<_>>();

        let terrain = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            let (x, y) = (col as f32, row as f32);
            let lift: f32 = hills
                .iter()
                .map(|hill| {
                    let d2 = (x - hill.x).powi(2) + (y - hill.y).powi(2);
                    hill.height * (-d2 / (2.0 * hill.spread * hill.spread)).exp()
                })
                .sum();
            1200.0 - lift
        });

        let min_side = w.min(h);
        let radius_range = (min_side * 0.04).max(2.0)..(min_side * 0.08).max(3.0);
        let mut markers: Vec<Marker> = Vec::with_capacity(config.markers);
        let mut attempts = 0;
        while markers.len() < config.markers && attempts < config.markers * 50 {
            attempts += 1;
            let r = rng.gen_range(radius_range.clone());
            let margin = r + 2.0;
            if w <= 2.0 * margin || h <= 2.0 * margin {
                break;
            }
            let candidate = Marker {
                x: rng.gen_range(margin..w - margin),
                y: rng.gen_range(margin..h - margin),
                r,
            };
            let overlaps = markers.iter().any(|other| {
                let d = ((candidate.x - other.x).powi(2) + (candidate.y - other.y).powi(2)).sqrt();
                d < (candidate.r + other.r) * 2.0
            });
            if !overlaps {
                markers.push(candidate);
            }
        }

        Self {
            config: SyntheticConfig {
                width,
                height,
                ..config
            },
            terrain,
            markers,
            rng: Mutex::new(rng),
            led: Mutex::new(LedState::Off),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn led_state(&self) -> LedState {
        match self.led.lock() {
            Ok(guard) => *guard,
            Err(_) => LedState::Off,
        }
    }

    fn noisy_depth(&self) -> SandResult<Array2<u16>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| SandError::Capture("synthetic sensor poisoned".into()))?;
        let noise = self.config.noise.abs();
        Ok(self.terrain.map(|depth| {
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            (depth + jitter).clamp(0.0, MAX_DEPTH as f32) as u16
        }))
    }

    fn inside_marker(&self, x: f32, y: f32) -> bool {
        self.markers
            .iter()
            .any(|m| (x - m.x).powi(2) + (y - m.y).powi(2) <= m.r * m.r)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl DepthCamera for SyntheticCamera {
    fn depth_frame(&self) -> SandResult<Frame> {
        let depth = self.noisy_depth()?;
        let data = depth
            .iter()
            .map(|&sample| 255 - ((sample as u32 * 255) / MAX_DEPTH as u32) as u8)
            .collect();
        Ok(Frame::new(
            self.config.width,
            self.config.height,
            PixelFormat::Gray8,
            data,
        ))
    }

    fn ir_frame(&self) -> SandResult<Frame> {
        let depth = self.noisy_depth()?;
        let data = depth
            .iter()
            .map(|&sample| (((MAX_DEPTH - sample.min(MAX_DEPTH)) as u32 * 3) / 16).min(255) as u8)
            .collect();
        Ok(Frame::new(
            self.config.width,
            self.config.height,
            PixelFormat::Gray8,
            data,
        ))
    }

    fn color_frame(&self) -> SandResult<Frame> {
        let depth = self.noisy_depth()?;
        let mut data = Vec::with_capacity(depth.len() * 4);
        for ((row, col), &sample) in depth.indexed_iter() {
            if self.inside_marker(col as f32, row as f32) {
                data.extend_from_slice(&MARKER_RGB);
            } else {
                let shade = 0.75 + 0.25 * (1200.0 - sample as f32).clamp(0.0, 300.0) / 300.0;
                data.extend(SAND_RGB.iter().map(|c| (c * shade).min(255.0) as u8));
            }
            data.push(255);
        }
        Ok(Frame::new(
            self.config.width,
            self.config.height,
            PixelFormat::Rgba8,
            data,
        ))
    }

    fn depth_array(&self) -> SandResult<DepthArray> {
        DepthArray::from_matrix(self.noisy_depth()?)
    }

    fn set_led(&self, state: LedState) -> SandResult<()> {
        let mut guard = self
            .led
            .lock()
            .map_err(|_| SandError::Capture("indicator state poisoned".into()))?;
        debug!("indicator {:?} -> {:?}", *guard, state);
        *guard = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_camera(seed: u64) -> SyntheticCamera {
        SyntheticCamera::new(SyntheticConfig {
            width: 160,
            height: 120,
            seed,
            ..Default::default()
        })
    }

    #[test]
    fn synthetic_frames_match_geometry() {
        let camera = small_camera(3);
        let color = camera.color_frame().unwrap();
        assert_eq!(color.data.len(), color.expected_len());
        let depth = camera.depth_array().unwrap();
        assert_eq!((depth.width(), depth.height()), (160, 120));
        assert!(depth.samples().iter().all(|&d| d <= MAX_DEPTH));
        assert_eq!(camera.ir_frame().unwrap().format, PixelFormat::Gray8);
    }

    #[test]
    fn synthetic_scene_is_seeded() {
        let a = small_camera(11);
        let b = small_camera(11);
        assert_eq!(a.markers(), b.markers());
        assert!(!a.markers().is_empty());
    }

    #[test]
    fn markers_are_dark_on_color_frame() {
        let camera = small_camera(5);
        let marker = camera.markers()[0];
        let frame = camera.color_frame().unwrap();
        let idx = (marker.y as usize * 160 + marker.x as usize) * 4;
        assert_eq!(&frame.data[idx..idx + 3], &MARKER_RGB);
    }

    #[test]
    fn led_state_is_recorded() {
        let camera = small_camera(0);
        camera.set_led(LedState::BlinkRedYellow).unwrap();
        assert_eq!(camera.led_state(), LedState::BlinkRedYellow);
    }
}
