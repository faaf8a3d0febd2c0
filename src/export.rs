//! Snapshot export of a laid-out diagram.
//!
//! The export frame is the bounding box of all nodes grown by
//! [`EXPORT_PADDING`] on each side. The canvas viewport is translated so the
//! box's top-left lands on `(padding, padding)` at zoom 1, then rasterized at
//! [`PIXEL_RATIO`] against a solid background.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Local};
use serde::Serialize;
use tiny_skia::{Pixmap, Transform};

use crate::error::ExportError;
use crate::layout::LaidOutGraph;
use crate::render::{DiagramRenderer, Viewport};
use crate::utils::slugify;

pub const EXPORT_PADDING: f32 = 50.0;
pub const PIXEL_RATIO: f32 = 3.0;
pub const EXPORT_BACKGROUND: &str = "#0f172a";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Axis-aligned box enclosing every node. Zero-sized for an empty graph.
pub fn node_bounds(laid_out: &LaidOutGraph) -> Bounds {
    let mut nodes = laid_out.graph.nodes.iter();
    let Some(first) = nodes.next() else {
        return Bounds::default();
    };

    let mut min_x = first.position.x;
    let mut min_y = first.position.y;
    let mut max_x = first.position.x + laid_out.node_width;
    let mut max_y = first.position.y + laid_out.node_height;

    for node in nodes {
        min_x = min_x.min(node.position.x);
        min_y = min_y.min(node.position.y);
        max_x = max_x.max(node.position.x + laid_out.node_width);
        max_y = max_y.max(node.position.y + laid_out.node_height);
    }

    Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportFrame {
    pub bounds: Bounds,
    pub width: f32,
    pub height: f32,
    pub viewport: Viewport,
}

pub fn export_frame(laid_out: &LaidOutGraph, padding: f32) -> Option<ExportFrame> {
    let bounds = node_bounds(laid_out);
    if bounds.is_empty() {
        return None;
    }

    // Whole pixels, so the canvas, the PNG and `pixel_size` agree.
    Some(ExportFrame {
        bounds,
        width: (bounds.width + padding * 2.0).ceil(),
        height: (bounds.height + padding * 2.0).ceil(),
        viewport: Viewport::translated(padding - bounds.x, padding - bounds.y),
    })
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub frame: ExportFrame,
    pub pixel_ratio: f32,
}

impl Screenshot {
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&self.png))
    }

    /// Writes the PNG into `dir` under its timestamped download name.
    pub fn save(
        &self,
        dir: &Path,
        provider: &str,
        pattern: &str,
        timestamp: DateTime<Local>,
    ) -> Result<PathBuf, ExportError> {
        let path = dir.join(download_filename(provider, pattern, timestamp));
        fs::write(&path, &self.png).map_err(|source| ExportError::Write {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.frame.width * self.pixel_ratio).ceil() as u32,
            (self.frame.height * self.pixel_ratio).ceil() as u32,
        )
    }
}

/// Rasterizes the diagram. Returns `Ok(None)` for an empty graph.
pub fn capture_screenshot(laid_out: &LaidOutGraph) -> Result<Option<Screenshot>, ExportError> {
    let Some(frame) = export_frame(laid_out, EXPORT_PADDING) else {
        log::debug!("nothing to capture: diagram has no nodes");
        return Ok(None);
    };

    let renderer = DiagramRenderer::new(laid_out.clone());
    let svg = renderer.render_svg(&frame.viewport, frame.width, frame.height, EXPORT_BACKGROUND)?;
    let png = rasterize(&svg, PIXEL_RATIO)?;

    log::info!(
        width = frame.width,
        height = frame.height,
        bytes = png.len();
        "captured diagram snapshot"
    );

    Ok(Some(Screenshot {
        png,
        frame,
        pixel_ratio: PIXEL_RATIO,
    }))
}

pub fn download_filename(provider: &str, pattern: &str, timestamp: DateTime<Local>) -> String {
    format!(
        "cloudiverse-{}-{}-{}.png",
        slugify(provider, "cloud"),
        slugify(pattern, "architecture"),
        timestamp.format("%Y%m%d-%H%M%S")
    )
}

/// Writes the snapshot into `dir`. Returns `Ok(None)` for an empty graph.
pub fn download_diagram(
    laid_out: &LaidOutGraph,
    dir: &Path,
    provider: &str,
    pattern: &str,
    timestamp: DateTime<Local>,
) -> Result<Option<PathBuf>, ExportError> {
    let Some(screenshot) = capture_screenshot(laid_out)? else {
        return Ok(None);
    };
    screenshot.save(dir, provider, pattern, timestamp).map(Some)
}

pub fn rasterize(svg: &str, scale: f32) -> Result<Vec<u8>, ExportError> {
    let mut options = resvg::usvg::Options::default();
    options.font_family = "Inter".to_string();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(svg, &options)
        .map_err(|err| ExportError::Svg(err.to_string()))?;

    let size = tree.size();
    let scaled_width = (size.width() * scale).ceil() as u32;
    let scaled_height = (size.height() * scale).ceil() as u32;

    let mut pixmap = Pixmap::new(scaled_width, scaled_height).ok_or(ExportError::Surface {
        width: scaled_width,
        height: scaled_height,
    })?;

    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| ExportError::Encode(err.to_string()))
}
