use serde::{Deserialize, Serialize};
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::ExportError;
use crate::export::{self, Bounds, Screenshot};
use crate::graph::{ArchitectureGraph, FlowEdge, FlowGraph, Point};
use crate::layout::{LaidOutGraph, LayoutConfig, RankDir, layout_graph};
use crate::utils::escape_xml;

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 2.0;
pub const CANVAS_BACKGROUND: &str = "#f8fafc";

const EDGE_LABEL_CHAR_WIDTH: f32 = 7.0;
const EDGE_LABEL_HEIGHT: f32 = 20.0;
const EDGE_LABEL_HORIZONTAL_PADDING: f32 = 12.0;
const MINIMAP_MARGIN: f32 = 8.0;

/// Pan and zoom state of the canvas: screen = world * zoom + (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn translated(x: f32, y: f32) -> Self {
        Self { x, y, zoom: 1.0 }
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    /// Zooms around `focus` (in screen coordinates), clamped to
    /// [`MIN_ZOOM`, `MAX_ZOOM`].
    pub fn zoom_by(&mut self, factor: f32, focus: Point) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let next = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let applied = next / self.zoom;
        self.x = focus.x - (focus.x - self.x) * applied;
        self.y = focus.y - (focus.y - self.y) * applied;
        self.zoom = next;
    }

    /// Viewport that shows `bounds` centred in a `width` x `height` canvas.
    pub fn fit_view(bounds: Bounds, width: f32, height: f32, padding: f32) -> Self {
        if bounds.is_empty() {
            return Self::default();
        }
        let available_w = (width - 2.0 * padding).max(1.0);
        let available_h = (height - 2.0 * padding).max(1.0);
        let zoom = (available_w / bounds.width)
            .min(available_h / bounds.height)
            .clamp(MIN_ZOOM, MAX_ZOOM);

        Self {
            x: (width - bounds.width * zoom) / 2.0 - bounds.x * zoom,
            y: (height - bounds.height * zoom) / 2.0 - bounds.y * zoom,
            zoom,
        }
    }

    pub fn to_world(&self, screen: Point) -> Point {
        Point {
            x: (screen.x - self.x) / self.zoom,
            y: (screen.y - self.y) / self.zoom,
        }
    }

    fn transform_attr(&self) -> String {
        format!(
            "translate({:.2} {:.2}) scale({:.4})",
            self.x, self.y, self.zoom
        )
    }
}

/// Interaction switches of the canvas. The architecture view is
/// presentational: panning and zooming only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub nodes_draggable: bool,
    pub nodes_connectable: bool,
    pub elements_selectable: bool,
    pub pan_on_drag: bool,
    pub zoom_on_scroll: bool,
}

impl Interaction {
    pub const READ_ONLY: Interaction = Interaction {
        nodes_draggable: false,
        nodes_connectable: false,
        elements_selectable: false,
        pan_on_drag: true,
        zoom_on_scroll: true,
    };
}

impl Default for Interaction {
    fn default() -> Self {
        Self::READ_ONLY
    }
}

/// Renders one laid-out architecture. Built fresh from the architecture
/// data every time it changes.
#[derive(Debug, Clone)]
pub struct DiagramRenderer {
    laid_out: LaidOutGraph,
    interaction: Interaction,
}

impl DiagramRenderer {
    pub fn new(laid_out: LaidOutGraph) -> Self {
        Self {
            laid_out,
            interaction: Interaction::READ_ONLY,
        }
    }

    pub fn from_architecture(architecture: &ArchitectureGraph, config: &LayoutConfig) -> Self {
        let flow = FlowGraph::from(architecture);
        Self::new(layout_graph(&flow, config))
    }

    pub fn laid_out(&self) -> &LaidOutGraph {
        &self.laid_out
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn bounds(&self) -> Bounds {
        export::node_bounds(&self.laid_out)
    }

    pub fn fit_view(&self, width: f32, height: f32) -> Viewport {
        Viewport::fit_view(self.bounds(), width, height, 0.1 * width.min(height))
    }

    /// See [`export::capture_screenshot`].
    pub fn capture_screenshot(&self) -> Result<Option<Screenshot>, ExportError> {
        export::capture_screenshot(&self.laid_out)
    }

    /// See [`export::download_diagram`].
    pub fn download_diagram(
        &self,
        dir: &Path,
        provider: &str,
        pattern: &str,
        timestamp: DateTime<Local>,
    ) -> Result<Option<PathBuf>, ExportError> {
        export::download_diagram(&self.laid_out, dir, provider, pattern, timestamp)
    }

    pub fn render_svg(
        &self,
        viewport: &Viewport,
        width: f32,
        height: f32,
        background: &str,
    ) -> Result<String, std::fmt::Error> {
        let mut svg = String::new();
        write!(
            svg,
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="Inter, system-ui, sans-serif">
  <defs>
    <marker id="arrow-end" markerWidth="8" markerHeight="8" refX="6" refY="4" orient="auto" markerUnits="strokeWidth">
      <path d="M1,1 L6,4 L1,7 z" fill="#64748b" />
    </marker>
  </defs>
  <rect width="100%" height="100%" fill="{}" />
  <g class="viewport" transform="{}">
"##,
            escape_xml(background),
            viewport.transform_attr()
        )?;

        for edge in &self.laid_out.graph.edges {
            self.write_edge(&mut svg, edge)?;
        }

        for node in &self.laid_out.graph.nodes {
            let x = node.position.x;
            let y = node.position.y;
            let w = self.laid_out.node_width;
            let h = self.laid_out.node_height;
            let cx = x + w / 2.0;

            writeln!(
                svg,
                "    <g class=\"node\" data-id=\"{}\">",
                escape_xml(&node.id)
            )?;
            writeln!(
                svg,
                "      <rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{w:.1}\" height=\"{h:.1}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"2\" />",
                node.style.background, node.style.border
            )?;

            let title = format!("{} {}", node.data.icon, node.data.label);
            match &node.data.role {
                Some(role) => {
                    writeln!(
                        svg,
                        "      <text x=\"{cx:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"14\" font-weight=\"600\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                        y + h * 0.4,
                        node.style.text,
                        escape_xml(&title)
                    )?;
                    writeln!(
                        svg,
                        "      <text x=\"{cx:.1}\" y=\"{:.1}\" fill=\"{}\" fill-opacity=\"0.75\" font-size=\"11\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                        y + h * 0.68,
                        node.style.text,
                        escape_xml(role)
                    )?;
                }
                None => {
                    writeln!(
                        svg,
                        "      <text x=\"{cx:.1}\" y=\"{:.1}\" fill=\"{}\" font-size=\"14\" font-weight=\"600\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                        y + h / 2.0,
                        node.style.text,
                        escape_xml(&title)
                    )?;
                }
            }
            svg.push_str("    </g>\n");
        }

        svg.push_str("  </g>\n</svg>\n");
        Ok(svg)
    }

    fn write_edge(&self, svg: &mut String, edge: &FlowEdge) -> Result<(), std::fmt::Error> {
        let Some(route) = self.edge_route(edge) else {
            return Ok(());
        };

        let points = route
            .iter()
            .map(|p| format!("{:.1},{:.1}", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            svg,
            "    <polyline class=\"edge\" data-id=\"{}\" points=\"{points}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\" marker-end=\"url(#arrow-end)\" />",
            escape_xml(&edge.id),
            edge.stroke
        )?;

        if let Some(label) = &edge.label {
            let center = route_midpoint(&route);
            let box_width =
                EDGE_LABEL_CHAR_WIDTH * label.chars().count() as f32 + EDGE_LABEL_HORIZONTAL_PADDING;
            writeln!(
                svg,
                "    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{box_width:.1}\" height=\"{EDGE_LABEL_HEIGHT:.1}\" rx=\"4\" ry=\"4\" fill=\"white\" fill-opacity=\"0.92\" />",
                center.x - box_width / 2.0,
                center.y - EDGE_LABEL_HEIGHT / 2.0
            )?;
            writeln!(
                svg,
                "    <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#334155\" font-size=\"11\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>",
                center.x,
                center.y,
                escape_xml(label)
            )?;
        }

        Ok(())
    }

    /// Step-shaped route between the source and target handles. Edges whose
    /// endpoints are not in the graph have no route and are not drawn.
    pub fn edge_route(&self, edge: &FlowEdge) -> Option<Vec<Point>> {
        let source = self.laid_out.graph.node(&edge.source)?.position;
        let target = self.laid_out.graph.node(&edge.target)?.position;
        let w = self.laid_out.node_width;
        let h = self.laid_out.node_height;

        let route = match self.laid_out.rank_dir {
            RankDir::LeftRight | RankDir::RightLeft => {
                let forward = target.x >= source.x;
                let (start_x, end_x) = if forward {
                    (source.x + w, target.x)
                } else {
                    (source.x, target.x + w)
                };
                let start = Point::new(start_x, source.y + h / 2.0);
                let end = Point::new(end_x, target.y + h / 2.0);
                let mid_x = (start.x + end.x) / 2.0;
                vec![start, Point::new(mid_x, start.y), Point::new(mid_x, end.y), end]
            }
            RankDir::TopBottom | RankDir::BottomTop => {
                let forward = target.y >= source.y;
                let (start_y, end_y) = if forward {
                    (source.y + h, target.y)
                } else {
                    (source.y, target.y + h)
                };
                let start = Point::new(source.x + w / 2.0, start_y);
                let end = Point::new(target.x + w / 2.0, end_y);
                let mid_y = (start.y + end.y) / 2.0;
                vec![start, Point::new(start.x, mid_y), Point::new(end.x, mid_y), end]
            }
        };

        Some(route)
    }

    /// Overview of the whole diagram scaled into `width` x `height`, with the
    /// visible region outlined when a canvas viewport is given.
    pub fn render_minimap(
        &self,
        width: f32,
        height: f32,
        visible: Option<(&Viewport, f32, f32)>,
    ) -> Result<String, std::fmt::Error> {
        let mut svg = String::new();
        writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width:.0}\" height=\"{height:.0}\" viewBox=\"0 0 {width:.0} {height:.0}\">"
        )?;
        writeln!(
            svg,
            "  <rect width=\"100%\" height=\"100%\" fill=\"#e2e8f0\" />"
        )?;

        let bounds = self.bounds();
        if !bounds.is_empty() {
            let scale = ((width - 2.0 * MINIMAP_MARGIN) / bounds.width)
                .min((height - 2.0 * MINIMAP_MARGIN) / bounds.height)
                .max(0.0);
            let offset_x = (width - bounds.width * scale) / 2.0 - bounds.x * scale;
            let offset_y = (height - bounds.height * scale) / 2.0 - bounds.y * scale;

            for node in &self.laid_out.graph.nodes {
                writeln!(
                    svg,
                    "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"2\" fill=\"{}\" />",
                    node.position.x * scale + offset_x,
                    node.position.y * scale + offset_y,
                    self.laid_out.node_width * scale,
                    self.laid_out.node_height * scale,
                    node.style.border
                )?;
            }

            if let Some((viewport, canvas_w, canvas_h)) = visible {
                let top_left = viewport.to_world(Point::ORIGIN);
                let bottom_right = viewport.to_world(Point::new(canvas_w, canvas_h));
                writeln!(
                    svg,
                    "  <rect class=\"visible-area\" x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"none\" stroke=\"#0f172a\" stroke-width=\"1.5\" />",
                    top_left.x * scale + offset_x,
                    top_left.y * scale + offset_y,
                    (bottom_right.x - top_left.x) * scale,
                    (bottom_right.y - top_left.y) * scale
                )?;
            }
        }

        svg.push_str("</svg>\n");
        Ok(svg)
    }
}

fn route_midpoint(route: &[Point]) -> Point {
    match route.len() {
        0 => Point::ORIGIN,
        1 => route[0],
        len if len % 2 == 0 => {
            let a = route[len / 2 - 1];
            let b = route[len / 2];
            Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
        }
        len => route[len / 2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ArchitectureEdge, ArchitectureNode};

    fn renderer() -> DiagramRenderer {
        let architecture = ArchitectureGraph {
            nodes: vec![
                ArchitectureNode {
                    id: "api".into(),
                    label: Some("API <v2>".into()),
                    category: Some("compute".into()),
                    kind: Some("container".into()),
                    role: Some("public entrypoint".into()),
                },
                ArchitectureNode {
                    id: "db".into(),
                    label: Some("Orders DB".into()),
                    category: Some("database".into()),
                    kind: Some("database".into()),
                    role: None,
                },
            ],
            edges: vec![
                ArchitectureEdge {
                    from: "api".into(),
                    to: "db".into(),
                    label: Some("reads".into()),
                },
                ArchitectureEdge {
                    from: "api".into(),
                    to: "missing".into(),
                    label: None,
                },
            ],
        };
        DiagramRenderer::from_architecture(&architecture, &LayoutConfig::default())
    }

    #[test]
    fn renders_nodes_and_skips_dangling_edges() {
        let renderer = renderer();
        let svg = renderer
            .render_svg(&Viewport::default(), 800.0, 600.0, CANVAS_BACKGROUND)
            .unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("API &lt;v2&gt;"));
        assert!(svg.contains("public entrypoint"));
        assert!(svg.contains("data-id=\"e-api-db\""));
        assert!(!svg.contains("e-api-missing"));
        assert_eq!(svg.matches("class=\"node\"").count(), 2);
    }

    #[test]
    fn read_only_by_default() {
        let interaction = renderer().interaction();
        assert!(!interaction.nodes_draggable);
        assert!(!interaction.nodes_connectable);
        assert!(!interaction.elements_selectable);
        assert!(interaction.pan_on_drag);
    }

    #[test]
    fn zoom_is_bounded() {
        let mut viewport = Viewport::default();
        viewport.zoom_by(100.0, Point::ORIGIN);
        assert_eq!(viewport.zoom, MAX_ZOOM);
        viewport.zoom_by(0.0001, Point::ORIGIN);
        assert_eq!(viewport.zoom, MIN_ZOOM);
        viewport.zoom_by(-1.0, Point::ORIGIN);
        assert_eq!(viewport.zoom, MIN_ZOOM);
    }

    #[test]
    fn zoom_keeps_focus_fixed() {
        let mut viewport = Viewport::translated(10.0, 20.0);
        let focus = Point::new(200.0, 100.0);
        let before = viewport.to_world(focus);
        viewport.zoom_by(1.5, focus);
        let after = viewport.to_world(focus);
        assert!((before.x - after.x).abs() < 1e-3);
        assert!((before.y - after.y).abs() < 1e-3);
    }

    #[test]
    fn fit_view_centres_content() {
        let renderer = renderer();
        let viewport = renderer.fit_view(1000.0, 500.0);
        let bounds = renderer.bounds();
        let left = bounds.x * viewport.zoom + viewport.x;
        let right = (bounds.x + bounds.width) * viewport.zoom + viewport.x;
        assert!((left - (1000.0 - right)).abs() < 1e-2);
        assert!(viewport.zoom <= MAX_ZOOM);
    }

    #[test]
    fn minimap_draws_every_node() {
        let renderer = renderer();
        let viewport = Viewport::default();
        let svg = renderer
            .render_minimap(200.0, 150.0, Some((&viewport, 800.0, 600.0)))
            .unwrap();
        assert_eq!(svg.matches("rx=\"2\"").count(), 2);
        assert!(svg.contains("visible-area"));
    }

    #[test]
    fn edge_route_runs_between_handles() {
        let renderer = renderer();
        let edge = &renderer.laid_out().graph.edges[0];
        let route = renderer.edge_route(edge).unwrap();
        let api = renderer.laid_out().graph.node("api").unwrap().position;
        assert_eq!(route.first().unwrap().x, api.x + renderer.laid_out().node_width);
        assert_eq!(route.len(), 4);
    }
}
