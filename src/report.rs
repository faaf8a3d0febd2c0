//! PDF report for a generated architecture.
//!
//! The report is laid out in one pass, top to bottom: header band, project
//! overview, metadata table, cost line, diagram snapshot and services table.
//! Page numbers are stamped in a second pass once the page count is known.

use printpdf::path::PaintMode;
use printpdf::*;
use serde::Serialize;
use serde_json::Value;

use crate::error::ReportError;
use crate::metadata::get_service_metadata;
use crate::utils::wrap_text;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const HEADER_HEIGHT: f32 = 18.0;
const CONTENT_TOP: f32 = HEADER_HEIGHT + 10.0;
const CONTENT_BOTTOM: f32 = PAGE_HEIGHT - 18.0;
const LINE_HEIGHT: f32 = 6.0;
const MIN_DIAGRAM_HEIGHT: f32 = 60.0;
const IMAGE_DPI: f32 = 300.0;
const MM_PER_INCH: f32 = 25.4;

pub const NOT_SELECTED: &str = "Not Selected";
pub const AUTO_DETECTED: &str = "Auto-detected";
pub const MANUAL_ESTIMATE: &str = "Manual Est.";
pub const NO_DIAGRAM: &str = "[Architecture diagram not captured]";
pub const UNREADABLE_DIAGRAM: &str = "[Architecture diagram could not be decoded]";

const PROJECT_NAME_PATHS: &[&str] = &["/project/name", "/workspace/name", "/name", "/project_name"];
const DESCRIPTION_PATHS: &[&str] = &[
    "/project/description",
    "/description",
    "/infraSpec/description",
    "/input/description",
];
const PROVIDER_PATHS: &[&str] = &[
    "/provider",
    "/infraSpec/provider",
    "/architecture/provider",
    "/selected_provider",
    "/cost_estimate/recommended_provider",
];
const REGION_PATHS: &[&str] = &["/region", "/infraSpec/region", "/deployment/region", "/regions/0"];
const ENVIRONMENT_PATHS: &[&str] = &[
    "/environment",
    "/infraSpec/environment",
    "/deployment/environment",
];
const COST_PROFILE_PATHS: &[&str] = &[
    "/cost_profile",
    "/costProfile",
    "/infraSpec/cost_profile",
    "/preferences/cost_profile",
];
const PATTERN_PATHS: &[&str] = &["/pattern", "/architecture/pattern", "/infraSpec/pattern"];
const MONTHLY_COST_PATHS: &[&str] = &[
    "/cost_estimate/total_monthly",
    "/cost/monthly",
    "/costEstimate/total",
    "/estimated_monthly_cost",
];
const SERVICES_PATHS: &[&str] = &[
    "/services",
    "/architecture/services",
    "/deployable_services",
    "/infraSpec/services",
    "/architecture/nodes",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportService {
    pub name: String,
    pub category: String,
    pub description: String,
}

/// Everything the report prints, in one canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportInput {
    pub project_name: String,
    pub description: String,
    pub provider: String,
    pub region: String,
    pub environment: String,
    pub cost_profile: String,
    pub pattern: String,
    pub monthly_cost: Option<f64>,
    pub services: Vec<ReportService>,
    /// Fields that were not found at their canonical location.
    pub warnings: Vec<String>,
}

struct Resolver<'a> {
    root: &'a Value,
    warnings: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn find(&mut self, field: &str, paths: &[&str]) -> Option<&'a Value> {
        for (idx, path) in paths.iter().enumerate() {
            let Some(value) = self.root.pointer(path) else {
                continue;
            };
            if value.is_null() || value.as_str().is_some_and(|text| text.trim().is_empty()) {
                continue;
            }
            if idx > 0 {
                log::warn!(field, path = *path; "report field resolved from non-canonical location");
                self.warnings
                    .push(format!("{field} resolved from non-canonical '{path}'"));
            }
            return Some(value);
        }
        None
    }

    fn text(&mut self, field: &str, paths: &[&str], default: &str) -> String {
        match self.find(field, paths).and_then(value_as_text) {
            Some(text) => text,
            None => {
                log::warn!(field, default; "report field missing, using placeholder");
                self.warnings
                    .push(format!("{field} missing, defaulted to '{default}'"));
                default.to_string()
            }
        }
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn value_as_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    }
}

fn service_from_value(value: &Value) -> Option<ReportService> {
    let (name, category) = match value {
        Value::String(name) => (name.clone(), None),
        Value::Object(map) => {
            let name = ["name", "label", "service", "id"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))?
                .to_string();
            let category = ["category", "type"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string);
            (name, category)
        }
        _ => return None,
    };

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| get_service_metadata(&name).desc.to_string());

    Some(ReportService {
        name,
        category: category.unwrap_or_else(|| "other".to_string()),
        description,
    })
}

impl ReportInput {
    /// Resolves every field through its fallback chain. Values that come
    /// from a non-canonical location, or fall back to a placeholder, are
    /// recorded in [`ReportInput::warnings`].
    pub fn from_response(response: &Value) -> Self {
        let mut resolver = Resolver {
            root: response,
            warnings: Vec::new(),
        };

        let project_name = resolver.text("project name", PROJECT_NAME_PATHS, "Untitled Project");
        let description = resolver.text("description", DESCRIPTION_PATHS, "No description available");
        let provider = resolver.text("provider", PROVIDER_PATHS, NOT_SELECTED);
        let region = resolver.text("region", REGION_PATHS, AUTO_DETECTED);
        let environment = resolver.text("environment", ENVIRONMENT_PATHS, NOT_SELECTED);
        let cost_profile = resolver.text("cost profile", COST_PROFILE_PATHS, NOT_SELECTED);
        let pattern = resolver.text("pattern", PATTERN_PATHS, "Custom");
        let monthly_cost = resolver
            .find("monthly cost", MONTHLY_COST_PATHS)
            .and_then(value_as_amount);
        let services = resolver
            .find("services", SERVICES_PATHS)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(service_from_value).collect())
            .unwrap_or_default();

        Self {
            project_name,
            description,
            provider,
            region,
            environment,
            cost_profile,
            pattern,
            monthly_cost,
            services,
            warnings: resolver.warnings,
        }
    }

    /// Strict variant: every field must sit at its canonical location.
    pub fn from_canonical(response: &Value) -> Result<Self, ReportError> {
        let required = [
            ("project name", PROJECT_NAME_PATHS[0]),
            ("provider", PROVIDER_PATHS[0]),
            ("region", REGION_PATHS[0]),
            ("environment", ENVIRONMENT_PATHS[0]),
            ("cost profile", COST_PROFILE_PATHS[0]),
            ("services", SERVICES_PATHS[0]),
        ];
        for (field, path) in required {
            if response.pointer(path).is_none_or(Value::is_null) {
                return Err(ReportError::NonCanonical(field));
            }
        }
        Ok(Self::from_response(response))
    }

    pub fn cost_summary(&self) -> String {
        match self.monthly_cost {
            Some(amount) => format!("Estimated monthly cost: ${amount:.2}"),
            None => format!("Estimated monthly cost: {MANUAL_ESTIMATE}"),
        }
    }
}

struct ReportWriter {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    pages: Vec<(PdfPageIndex, PdfLayerReference)>,
    /// Headings in order, with the zero-based page they landed on.
    outline: Vec<(String, usize)>,
    cursor: f32,
    title: String,
}

impl ReportWriter {
    fn new(title: &str) -> Result<Self, ReportError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;
        let first = doc.get_page(page).get_layer(layer);

        let mut writer = Self {
            doc,
            regular,
            bold,
            pages: Vec::new(),
            outline: Vec::new(),
            cursor: CONTENT_TOP,
            title: title.to_string(),
        };
        writer.start_page(page, first);
        Ok(writer)
    }

    fn layer(&self) -> &PdfLayerReference {
        // `pages` is never empty after `new`.
        &self.pages[self.pages.len() - 1].1
    }

    fn start_page(&mut self, page: PdfPageIndex, layer: PdfLayerReference) {
        layer.set_fill_color(rgb(0x1e, 0x3a, 0x8a));
        layer.add_rect(
            Rect::new(
                Mm(0.0),
                Mm(PAGE_HEIGHT - HEADER_HEIGHT),
                Mm(PAGE_WIDTH),
                Mm(PAGE_HEIGHT),
            )
            .with_mode(PaintMode::Fill),
        );
        layer.set_fill_color(rgb(0xff, 0xff, 0xff));
        layer.use_text(
            pdf_text(&self.title),
            14.0,
            Mm(MARGIN),
            Mm(PAGE_HEIGHT - HEADER_HEIGHT + 6.5),
            &self.bold,
        );
        layer.set_fill_color(rgb(0x1e, 0x29, 0x3b));

        self.pages.push((page, layer));
        self.cursor = CONTENT_TOP;
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Page {}", self.pages.len() + 1));
        let layer = self.doc.get_page(page).get_layer(layer);
        self.start_page(page, layer);
    }

    fn remaining(&self) -> f32 {
        CONTENT_BOTTOM - self.cursor
    }

    fn ensure_space(&mut self, height: f32) {
        if self.remaining() < height {
            self.new_page();
        }
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        self.ensure_space(LINE_HEIGHT);
        let font = if bold { &self.bold } else { &self.regular };
        self.layer().use_text(
            pdf_text(text),
            size,
            Mm(MARGIN),
            Mm(PAGE_HEIGHT - self.cursor),
            font,
        );
        self.cursor += LINE_HEIGHT;
    }

    fn cells(&mut self, cells: &[(&str, f32)], size: f32, bold: bool) {
        self.ensure_space(LINE_HEIGHT);
        let font = if bold { &self.bold } else { &self.regular };
        for (text, x) in cells {
            self.layer().use_text(
                pdf_text(text),
                size,
                Mm(*x),
                Mm(PAGE_HEIGHT - self.cursor),
                font,
            );
        }
        self.cursor += LINE_HEIGHT;
    }

    /// A heading never ends a page: at least two lines follow it.
    fn heading(&mut self, text: &str) {
        self.heading_with(text, 0.0);
    }

    /// Like `heading`, but also keeps `keep_with` millimetres of the next
    /// block on the same page.
    fn heading_with(&mut self, text: &str, keep_with: f32) {
        self.ensure_space(LINE_HEIGHT * 3.0 + keep_with);
        self.cursor += LINE_HEIGHT / 2.0;
        self.line(text, 13.0, true);
        self.outline.push((text.to_string(), self.pages.len() - 1));
    }

    fn diagram_section(&mut self, png: Option<&[u8]>) {
        let keep_with = if png.is_some() { MIN_DIAGRAM_HEIGHT } else { 0.0 };
        self.heading_with("Architecture Diagram", keep_with);
        self.diagram(png);
    }

    fn gap(&mut self) {
        self.cursor += LINE_HEIGHT / 2.0;
    }

    fn diagram(&mut self, png: Option<&[u8]>) {
        let Some(bytes) = png else {
            self.line(NO_DIAGRAM, 10.0, false);
            return;
        };

        let decoded = match image_crate::load_from_memory(bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!(error:% = err; "diagram snapshot could not be decoded");
                self.line(UNREADABLE_DIAGRAM, 10.0, false);
                return;
            }
        };

        let pixels = decoded.to_rgb8();
        let (pixel_w, pixel_h) = pixels.dimensions();
        let rgb_image = image_crate::DynamicImage::ImageRgb8(pixels);
        let natural_w = pixel_w as f32 / IMAGE_DPI * MM_PER_INCH;
        let natural_h = pixel_h as f32 / IMAGE_DPI * MM_PER_INCH;
        if natural_w <= 0.0 || natural_h <= 0.0 {
            self.line(UNREADABLE_DIAGRAM, 10.0, false);
            return;
        }

        let max_w = PAGE_WIDTH - 2.0 * MARGIN;
        if self.remaining() < MIN_DIAGRAM_HEIGHT {
            self.new_page();
        }
        let max_h = self.remaining();
        let scale = (max_w / natural_w).min(max_h / natural_h);
        let drawn_h = natural_h * scale;

        Image::from_dynamic_image(&rgb_image).add_to_layer(
            self.layer().clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(PAGE_HEIGHT - self.cursor - drawn_h)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
        self.cursor += drawn_h + LINE_HEIGHT;
    }

    /// Writes "Page i of n" on every page and returns the labels in page order.
    fn stamp_page_numbers(&self) -> Vec<String> {
        let total = self.pages.len();
        let mut labels = Vec::with_capacity(total);
        for (idx, (_, layer)) in self.pages.iter().enumerate() {
            let label = format!("Page {} of {}", idx + 1, total);
            layer.set_fill_color(rgb(0x64, 0x74, 0x8b));
            layer.use_text(
                label.clone(),
                9.0,
                Mm(PAGE_WIDTH - MARGIN - 22.0),
                Mm(10.0),
                &self.regular,
            );
            labels.push(label);
        }
        labels
    }

    fn finish(self) -> Result<Vec<u8>, ReportError> {
        self.stamp_page_numbers();
        for (text, page) in &self.outline {
            self.doc.add_bookmark(text.clone(), self.pages[*page].0);
        }
        self.doc.save_to_bytes().map_err(pdf_error)
    }
}

fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb(Rgb::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        None,
    ))
}

fn pdf_error(err: impl std::fmt::Display) -> ReportError {
    ReportError::Pdf(err.to_string())
}

// Built-in PDF fonts only cover Latin-1.
fn pdf_text(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_control())
        .map(|ch| if (ch as u32) < 0x100 { ch } else { '?' })
        .collect()
}

/// Builds the PDF. `diagram_png` is the snapshot captured by the exporter,
/// if any.
pub fn build_report(input: &ReportInput, diagram_png: Option<&[u8]>) -> Result<Vec<u8>, ReportError> {
    let writer = write_report(input, diagram_png)?;
    let pages = writer.pages.len();
    let bytes = writer.finish()?;
    log::info!(pages, bytes = bytes.len(); "built architecture report");
    Ok(bytes)
}

fn write_report(input: &ReportInput, diagram_png: Option<&[u8]>) -> Result<ReportWriter, ReportError> {
    let mut writer = ReportWriter::new("Cloudiverse Architecture Report")?;

    writer.heading(&input.project_name);
    for line in wrap_text(&input.description, 90) {
        writer.line(&line, 10.0, false);
    }

    writer.heading("Project Details");
    let rows = [
        ("Cloud Provider", input.provider.as_str()),
        ("Region", input.region.as_str()),
        ("Environment", input.environment.as_str()),
        ("Cost Profile", input.cost_profile.as_str()),
        ("Architecture Pattern", input.pattern.as_str()),
    ];
    for (key, value) in rows {
        writer.cells(&[(key, MARGIN), (value, MARGIN + 55.0)], 10.0, false);
    }

    writer.heading("Cost Summary");
    writer.line(&input.cost_summary(), 11.0, false);

    writer.diagram_section(diagram_png);

    writer.heading("Services");
    if input.services.is_empty() {
        writer.line("No services listed", 10.0, false);
    } else {
        writer.cells(
            &[("Service", MARGIN), ("Category", MARGIN + 55.0), ("Description", MARGIN + 90.0)],
            10.0,
            true,
        );
        for service in &input.services {
            let description = wrap_text(&service.description, 50);
            let first = description.first().map(String::as_str).unwrap_or_default();
            writer.cells(
                &[
                    (service.name.as_str(), MARGIN),
                    (service.category.as_str(), MARGIN + 55.0),
                    (first, MARGIN + 90.0),
                ],
                9.0,
                false,
            );
            for rest in description.iter().skip(1) {
                writer.cells(&[(rest.as_str(), MARGIN + 90.0)], 9.0, false);
            }
        }
    }

    writer.gap();
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_payload_resolves_without_warnings() {
        let response = json!({
            "project": {"name": "Shop", "description": "An online shop"},
            "provider": "AWS",
            "region": "us-east-1",
            "environment": "production",
            "cost_profile": "balanced",
            "pattern": "three_tier",
            "cost_estimate": {"total_monthly": 412.5},
            "services": [{"name": "RDS", "category": "database"}, "redis"]
        });
        let input = ReportInput::from_response(&response);

        assert!(input.warnings.is_empty(), "{:?}", input.warnings);
        assert_eq!(input.provider, "AWS");
        assert_eq!(input.monthly_cost, Some(412.5));
        assert_eq!(input.services.len(), 2);
        assert_eq!(input.services[1].category, "other");
        assert_eq!(input.services[1].description, get_service_metadata("redis").desc);
        assert!(ReportInput::from_canonical(&response).is_ok());
    }

    #[test]
    fn fallbacks_are_flagged() {
        let response = json!({
            "infraSpec": {"provider": "gcp", "region": ""},
            "deployment": {"region": "europe-west1"},
            "cost": {"monthly": "$1,200.00"}
        });
        let input = ReportInput::from_response(&response);

        assert_eq!(input.provider, "gcp");
        assert_eq!(input.region, "europe-west1");
        assert_eq!(input.environment, NOT_SELECTED);
        assert_eq!(input.cost_profile, NOT_SELECTED);
        assert_eq!(input.monthly_cost, Some(1200.0));
        assert!(input.warnings.iter().any(|w| w.contains("/infraSpec/provider")));
        assert!(input.warnings.iter().any(|w| w.starts_with("environment missing")));

        assert!(matches!(
            ReportInput::from_canonical(&response),
            Err(ReportError::NonCanonical("project name"))
        ));
    }

    #[test]
    fn empty_payload_uses_placeholders() {
        let input = ReportInput::from_response(&json!({}));
        assert_eq!(input.region, AUTO_DETECTED);
        assert_eq!(input.cost_summary(), "Estimated monthly cost: Manual Est.");
        assert!(input.services.is_empty());
    }

    #[test]
    fn builds_pdf_without_diagram() {
        let input = ReportInput::from_response(&json!({"project": {"name": "Empty"}}));
        let pdf = build_report(&input, None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn undecodable_diagram_does_not_fail() {
        let input = ReportInput::from_response(&json!({}));
        let pdf = build_report(&input, Some(b"not a png")).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    fn snapshot_png(width: u32, height: u32) -> Vec<u8> {
        let mut pixmap = tiny_skia::Pixmap::new(width, height).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(0x1e, 0x3a, 0x8a, 0xff));
        pixmap.encode_png().unwrap()
    }

    #[test]
    fn long_service_list_spans_pages() {
        let services: Vec<Value> = (0..80)
            .map(|i| json!({"name": format!("service-{i}"), "category": "compute"}))
            .collect();
        let input = ReportInput::from_response(&json!({
            "project": {"name": "Large", "description": "Many services"},
            "services": services
        }));
        let png = snapshot_png(900, 450);

        let writer = write_report(&input, Some(&png)).unwrap();
        let total = writer.pages.len();
        assert!(total >= 3, "expected at least 3 pages, got {total}");

        let labels = writer.stamp_page_numbers();
        let expected: Vec<String> = (1..=total).map(|n| format!("Page {n} of {total}")).collect();
        assert_eq!(labels, expected);

        let services_page = writer
            .outline
            .iter()
            .find(|(text, _)| text == "Services")
            .map(|(_, page)| *page)
            .unwrap();
        assert!(services_page < total - 1, "service rows should continue past the heading page");

        let pdf = writer.finish().unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn diagram_heading_moves_with_the_snapshot() {
        let png = snapshot_png(600, 300);

        let mut writer = ReportWriter::new("Report").unwrap();
        writer.cursor = CONTENT_BOTTOM - 40.0;
        writer.diagram_section(Some(&png));
        assert_eq!(writer.pages.len(), 2);
        assert_eq!(writer.outline, [("Architecture Diagram".to_string(), 1)]);
        assert!(writer.cursor > CONTENT_TOP + MIN_DIAGRAM_HEIGHT.min(40.0));

        let mut writer = ReportWriter::new("Report").unwrap();
        writer.cursor = CONTENT_BOTTOM - 40.0;
        writer.diagram_section(None);
        assert_eq!(writer.pages.len(), 1);
        assert_eq!(writer.outline, [("Architecture Diagram".to_string(), 0)]);
    }

    #[test]
    fn diagram_starts_a_new_page_when_space_runs_out() {
        let png = snapshot_png(600, 300);

        let mut writer = ReportWriter::new("Report").unwrap();
        writer.cursor = CONTENT_BOTTOM - (MIN_DIAGRAM_HEIGHT - 1.0);
        writer.diagram(Some(&png));
        assert_eq!(writer.pages.len(), 2);
        assert!(writer.cursor > CONTENT_TOP);
    }

    #[test]
    fn pdf_text_replaces_unsupported_glyphs() {
        assert_eq!(pdf_text("⚙️ Café\n"), "?? Café");
    }
}
