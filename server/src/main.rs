use anyhow::Context;
use bridge::{routes, AppState};
use clap::Parser;
use config::ServerConfig;
use log::{error, info};
use sandcore::detection::CircleDetector;
use sandcore::device::{indicate, DepthCamera, LedState, SyntheticCamera};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

mod bridge;
mod config;
mod stream;

#[derive(Parser)]
#[command(author, version, about = "Depth-camera sandbox streaming server")]
struct Args {
    /// Load server settings from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    /// JPEG quality for frame routes and streams (1-100)
    #[arg(long)]
    quality: Option<u8>,
    /// Default stream interval when the request path carries none
    #[arg(long)]
    interval_ms: Option<u64>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Seed for the synthetic terrain and markers
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(quality) = self.quality {
            config.image_quality = quality;
        }
        if let Some(interval) = self.interval_ms {
            config.stream_interval_ms = interval;
        }
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if let Some(seed) = self.seed {
            config.camera.seed = seed;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut server_config = if let Some(path) = args.config.as_ref() {
        ServerConfig::load(path)?
    } else {
        ServerConfig::default()
    };
    args.apply(&mut server_config);

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating server runtime")?;
    runtime.block_on(serve(server_config))
}

async fn serve(server_config: ServerConfig) -> anyhow::Result<()> {
    let camera = Arc::new(SyntheticCamera::new(server_config.camera.clone()));
    let pause = server_config.led_sleep();
    led_sequence(camera.as_ref(), &[LedState::Yellow, LedState::Green, LedState::Off], pause).await;

    let state = AppState::new(
        camera.clone(),
        CircleDetector::hough(),
        server_config.image_quality,
        server_config.stream_interval(),
    );
    let addr = server_config.bind_address()?;
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, async {
            if let Err(err) = signal::ctrl_c().await {
                error!("waiting for Ctrl+C failed: {}", err);
            }
            info!("shutdown requested");
        })
        .with_context(|| format!("binding {}", addr))?;

    info!("Starting HTTP server on {}", bound);
    server.await;

    led_sequence(camera.as_ref(), &[LedState::Yellow, LedState::Red, LedState::Off], pause).await;
    info!("server stopped");
    Ok(())
}

async fn led_sequence(camera: &dyn DepthCamera, states: &[LedState], pause: Duration) {
    for (step, state) in states.iter().enumerate() {
        if step > 0 {
            tokio::time::sleep(pause).await;
        }
        indicate(camera, *state);
    }
}
