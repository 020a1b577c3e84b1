use std::path::PathBuf;

use dma_heatmap_shared::colors::{DEFAULT_END_COLOR, DEFAULT_START_COLOR};
use dma_heatmap_shared::{ColorStops, LegendPlacement, RenderSettings, Rgb};
use tracing::warn;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const SSE_KEEPALIVE_SECS: u64 = 15;
pub const DEFAULT_BROADCAST_BUFFER: usize = 256;
pub const DEFAULT_RENDERER_DIST_DIR: &str = "renderer/dist";

pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn sse_broadcast_buffer() -> usize {
    std::env::var("SSE_BROADCAST_BUFFER")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_BROADCAST_BUFFER)
}

pub fn legend_placement() -> LegendPlacement {
    match std::env::var("LEGEND_PLACEMENT") {
        Ok(value) => LegendPlacement::parse(&value).unwrap_or_else(|| {
            warn!(value = %value, "unknown LEGEND_PLACEMENT, using header legend");
            LegendPlacement::default()
        }),
        Err(_) => LegendPlacement::default(),
    }
}

pub fn color_stops() -> ColorStops {
    ColorStops::new(
        env_color("HEATMAP_START_COLOR", DEFAULT_START_COLOR),
        env_color("HEATMAP_END_COLOR", DEFAULT_END_COLOR),
    )
}

fn env_color(name: &str, fallback: Rgb) -> Rgb {
    let Ok(value) = std::env::var(name) else {
        return fallback;
    };
    value.parse().unwrap_or_else(|e| {
        warn!(error = %e, variable = name, "invalid color, using default {fallback}");
        fallback
    })
}

pub fn render_settings() -> RenderSettings {
    RenderSettings {
        stops: color_stops(),
        placement: legend_placement(),
    }
}

pub fn region_catalog_path() -> Option<PathBuf> {
    std::env::var("REGION_CATALOG_PATH")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn renderer_dist_dir() -> PathBuf {
    std::env::var("RENDERER_DIST_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDERER_DIST_DIR))
}
