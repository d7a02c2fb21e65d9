//! SVG file renderer.
//!
//! Builds the document in memory and writes it to disk on [`Device::close`].
//! Device coordinates are inches with the origin at the bottom-left; SVG
//! user units are points with the origin at the top-left, so every y value
//! is flipped against the page height and every length is scaled by 72.
//!
//! Consecutive shapes drawn with the same drawing context share one
//! `<g style='...'>` group, which keeps typical plots compact.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use griddev_core::domain::context::INCH_TO_POINTS_FACTOR;
use griddev_core::{
    Color, Device, DeviceError, DrawingContextValue, ImageInterpolation, LineEnd, LineJoin,
    LineType,
};
use tracing::debug;

const COORD_FACTOR: f64 = INCH_TO_POINTS_FACTOR;

pub struct SvgDevice {
    path: PathBuf,
    /// Width in inches.
    width: f64,
    /// Height in inches.
    height: f64,
    data: String,
    /// Style of the currently open `<g>` group, if any.
    group_ctx: Option<DrawingContextValue>,
}

impl SvgDevice {
    /// Creates a device writing to `path`, sized in inches.
    pub fn new(path: impl Into<PathBuf>, width: f64, height: f64) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            data: String::with_capacity(1024),
            group_ctx: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finishes the document and returns its text without touching the disk.
    pub fn contents(&mut self) -> String {
        self.ensure_page();
        let mut copy = self.data.clone();
        if self.group_ctx.is_some() {
            copy.push_str("</g>\n");
        }
        copy.push_str("</svg>\n");
        copy
    }

    fn ensure_page(&mut self) {
        if self.data.is_empty() {
            self.start_page();
        }
    }

    fn start_page(&mut self) {
        self.data.clear();
        self.group_ctx = None;
        self.data.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        self.data.push_str("<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n");
        let _ = writeln!(
            self.data,
            "<svg xmlns='http://www.w3.org/2000/svg' version='1.1' viewBox='0 0 {:.3} {:.3}'>",
            self.width * COORD_FACTOR,
            self.height * COORD_FACTOR
        );
    }

    fn flip_y(&self, y: f64) -> f64 {
        self.height - y
    }

    /// Opens a `<g>` group for `ctx` unless the current one already matches.
    fn apply_style(&mut self, ctx: &DrawingContextValue) {
        self.ensure_page();
        if self.group_ctx.as_ref() == Some(ctx) {
            return;
        }
        self.close_group();
        let style = style_for(ctx);
        let _ = writeln!(self.data, "<g style='{style}'>");
        self.group_ctx = Some(ctx.clone());
    }

    fn close_group(&mut self) {
        if self.group_ctx.take().is_some() {
            self.data.push_str("</g>\n");
        }
    }

    fn draw_points(&mut self, ctx: &DrawingContextValue, x: &[f64], y: &[f64], attributes: &str) {
        self.apply_style(ctx);
        let height = self.height;
        self.data.push_str("<polyline points='");
        for (px, py) in x.iter().zip(y) {
            let _ = write!(
                self.data,
                "{:.3},{:.3} ",
                px * COORD_FACTOR,
                (height - py) * COORD_FACTOR
            );
        }
        let _ = writeln!(self.data, "' {attributes}/>");
    }
}

impl Device for SvgDevice {
    fn open_new_page(&mut self) -> Result<(), DeviceError> {
        // A new page discards whatever was drawn on the previous one.
        self.start_page();
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        let contents = self.contents();
        std::fs::write(&self.path, contents).map_err(|source| DeviceError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(path = %self.path.display(), "SVG document written");
        Ok(())
    }

    fn draw_rect(
        &mut self,
        ctx: &DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        rotation: f64,
    ) -> Result<(), DeviceError> {
        self.apply_style(ctx);
        let top = self.flip_y(bottom_y + height) * COORD_FACTOR;
        let _ = write!(
            self.data,
            "<rect x='{:.3}' y='{top:.3}' width='{:.3}' height='{:.3}'",
            left_x * COORD_FACTOR,
            width * COORD_FACTOR,
            height * COORD_FACTOR
        );
        if rotation != 0.0 {
            let center_y = self.flip_y(bottom_y + height / 2.0) * COORD_FACTOR;
            let _ = write!(
                self.data,
                " transform='rotate({:.3} {:.3},{center_y:.3})'",
                to_degrees(rotation),
                (left_x + width / 2.0) * COORD_FACTOR
            );
        }
        self.data.push_str("/>\n");
        Ok(())
    }

    fn draw_poly_lines(
        &mut self,
        ctx: &DrawingContextValue,
        x: &[f64],
        y: &[f64],
        start_index: usize,
        length: usize,
    ) -> Result<(), DeviceError> {
        let range = start_index..start_index + length;
        self.draw_points(ctx, &x[range.clone()], &y[range], "style='fill:transparent' ");
        Ok(())
    }

    fn draw_polygon(
        &mut self,
        ctx: &DrawingContextValue,
        x: &[f64],
        y: &[f64],
        start_index: usize,
        length: usize,
    ) -> Result<(), DeviceError> {
        let range = start_index..start_index + length;
        self.draw_points(ctx, &x[range.clone()], &y[range], "");
        Ok(())
    }

    fn draw_circle(
        &mut self,
        ctx: &DrawingContextValue,
        center_x: f64,
        center_y: f64,
        radius: f64,
    ) -> Result<(), DeviceError> {
        self.apply_style(ctx);
        let cy = self.flip_y(center_y) * COORD_FACTOR;
        let _ = writeln!(
            self.data,
            "<circle cx='{:.3}' cy='{cy:.3}' r='{:.3}'/>",
            center_x * COORD_FACTOR,
            radius * COORD_FACTOR
        );
        Ok(())
    }

    /// Draws the raster as one filled cell per pixel; fully transparent pixels are skipped.
    fn draw_raster(
        &mut self,
        left_x: f64,
        bottom_y: f64,
        width: f64,
        height: f64,
        pixels: &[i32],
        columns: usize,
        interpolation: ImageInterpolation,
    ) -> Result<(), DeviceError> {
        if columns == 0 || pixels.len() % columns != 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "{} pixels do not form rows of {columns}",
                pixels.len()
            )));
        }
        self.ensure_page();
        self.close_group();
        let rows = pixels.len() / columns;
        let cell_w = width / columns as f64 * COORD_FACTOR;
        let cell_h = height / rows as f64 * COORD_FACTOR;
        let top = self.flip_y(bottom_y + height) * COORD_FACTOR;
        let rendering = match interpolation {
            ImageInterpolation::NearestNeighbor => "crispEdges",
            ImageInterpolation::Linear => "auto",
        };
        let _ = writeln!(self.data, "<g shape-rendering='{rendering}'>");
        for (index, raw) in pixels.iter().enumerate() {
            let color = Color::from_raw(*raw);
            if color.alpha() == 0 {
                continue;
            }
            let (row, col) = (index / columns, index % columns);
            let _ = writeln!(
                self.data,
                "<rect x='{:.3}' y='{:.3}' width='{:.3}' height='{:.3}' style='{}'/>",
                left_x * COORD_FACTOR + col as f64 * cell_w,
                top + row as f64 * cell_h,
                cell_w,
                cell_h,
                style_color("fill", color)
            );
        }
        self.data.push_str("</g>\n");
        Ok(())
    }

    fn draw_string(
        &mut self,
        ctx: &DrawingContextValue,
        left_x: f64,
        bottom_y: f64,
        rotation: f64,
        text: &str,
    ) -> Result<(), DeviceError> {
        self.ensure_page();
        self.close_group();
        let x = left_x * COORD_FACTOR;
        let y = self.flip_y(bottom_y) * COORD_FACTOR;
        let text_length = self.string_width(ctx, text) * COORD_FACTOR;
        let _ = write!(
            self.data,
            "<text x='{x:.3}' y='{y:.3}' textLength='{text_length:.3}px' lengthAdjust='spacingAndGlyphs' style='{};font-size:{}px",
            // SVG paints text with "fill"
            style_color("fill", ctx.color()),
            ctx.font_size()
        );
        if !ctx.font_family().is_empty() {
            let _ = write!(self.data, ";font-family:{}", escape_xml(ctx.font_family()));
        }
        self.data.push('\'');
        if rotation != 0.0 {
            let _ = write!(
                self.data,
                " transform='rotate({:.3} {x:.3},{y:.3})'",
                to_degrees(rotation)
            );
        }
        let _ = writeln!(self.data, ">{}</text>", escape_xml(text));
        Ok(())
    }

    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn native_width(&self) -> i32 {
        (self.width * COORD_FACTOR).round() as i32
    }

    fn native_height(&self) -> i32 {
        (self.height * COORD_FACTOR).round() as i32
    }

    /// Approximate advance width; [`Device::draw_string`] forces the text to this width.
    fn string_width(&self, ctx: &DrawingContextValue, text: &str) -> f64 {
        let factor = if ctx.font_style().is_bold() { 0.675 } else { 0.6 };
        let letter_width = ctx.font_size() / INCH_TO_POINTS_FACTOR;
        let base = text.chars().count() as f64 * factor * letter_width;
        text.chars().fold(base, |acc, c| match c {
            'w' | 'm' => acc + letter_width * 0.2,
            'z' | 'v' => acc + letter_width * 0.1,
            _ => acc,
        })
    }

    fn string_height(&self, ctx: &DrawingContextValue, _text: &str) -> f64 {
        0.7 * (ctx.font_size() / INCH_TO_POINTS_FACTOR)
    }
}

// ── Style helpers ─────────────────────────────────────────────────────────────

fn style_for(ctx: &DrawingContextValue) -> String {
    let mut style = String::new();
    match ctx.line_type() {
        LineType::Blank => style.push_str("stroke:transparent"),
        _ => style.push_str(&style_color("stroke", ctx.color())),
    }
    let _ = write!(
        style,
        ";{};stroke-width:{}",
        style_color("fill", ctx.fill_color()),
        ctx.line_width()
    );
    if let LineType::Pattern(segments) = ctx.line_type() {
        let dashes: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
        let _ = write!(style, ";stroke-dasharray:{}", dashes.join(","));
    }
    let _ = write!(
        style,
        ";stroke-linejoin:{};stroke-linecap:{}",
        line_join_name(ctx.line_join()),
        line_cap_name(ctx.line_end())
    );
    if ctx.line_join() == LineJoin::Mitre {
        let _ = write!(style, ";stroke-miterlimit:{}", ctx.line_mitre());
    }
    let _ = write!(style, ";font-size:{}px", ctx.font_size());
    if !ctx.font_family().is_empty() {
        let _ = write!(style, ";font-family:{}", escape_xml(ctx.font_family()));
    }
    if ctx.font_style().is_bold() {
        style.push_str(";font-weight:bold");
    }
    if ctx.font_style().is_italic() {
        style.push_str(";font-style:italic");
    }
    style
}

fn style_color(prefix: &str, color: Color) -> String {
    format!(
        "{prefix}:rgb({},{},{});{prefix}-opacity:{:.3}",
        color.red(),
        color.green(),
        color.blue(),
        f64::from(color.alpha()) / 255.0
    )
}

fn line_join_name(join: LineJoin) -> &'static str {
    match join {
        LineJoin::Round => "round",
        LineJoin::Mitre => "miter",
        LineJoin::Bevel => "bevel",
    }
}

fn line_cap_name(end: LineEnd) -> &'static str {
    match end {
        LineEnd::Round => "round",
        LineEnd::Butt => "butt",
        LineEnd::Square => "square",
    }
}

fn to_degrees(rotation_anticlockwise: f64) -> f64 {
    -rotation_anticlockwise.to_degrees()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use griddev_core::FontStyle;

    fn ctx() -> DrawingContextValue {
        DrawingContextValue::builder()
            .color(Color::from_rgba(255, 0, 0, 255))
            .build()
    }

    fn device() -> SvgDevice {
        SvgDevice::new(std::env::temp_dir().join("griddev-svg-unit.svg"), 2.0, 1.0)
    }

    #[test]
    fn test_viewbox_is_in_points() {
        let mut svg = device();
        let doc = svg.contents();
        assert!(doc.contains("viewBox='0 0 144.000 72.000'"));
        assert!(doc.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_rect_y_is_flipped_to_top_left_origin() {
        // Arrange
        let mut svg = device();

        // Act: a 0.5in square whose bottom edge sits at y = 0.25in
        svg.draw_rect(&ctx(), 1.0, 0.25, 0.5, 0.5, 0.0).unwrap();

        // Assert: top edge at 1.0 - 0.75 = 0.25in = 18pt
        let doc = svg.contents();
        assert!(doc.contains("<rect x='72.000' y='18.000' width='36.000' height='36.000'/>"));
    }

    #[test]
    fn test_same_context_shares_one_group() {
        let mut svg = device();
        svg.draw_circle(&ctx(), 0.5, 0.5, 0.1).unwrap();
        svg.draw_circle(&ctx(), 0.6, 0.5, 0.1).unwrap();
        let doc = svg.contents();
        assert_eq!(doc.matches("<g style=").count(), 1);
        assert_eq!(doc.matches("</g>").count(), 1);
    }

    #[test]
    fn test_blank_line_type_disables_stroke() {
        let blank = DrawingContextValue::builder().line_type(LineType::Blank).build();
        assert!(style_for(&blank).starts_with("stroke:transparent"));
    }

    #[test]
    fn test_dash_pattern_and_bold_italic_in_style() {
        let styled = DrawingContextValue::builder()
            .line_type(LineType::Pattern(vec![4, 2]))
            .font_style(FontStyle::BoldItalic)
            .build();
        let style = style_for(&styled);
        assert!(style.contains("stroke-dasharray:4,2"));
        assert!(style.contains("font-weight:bold"));
        assert!(style.contains("font-style:italic"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut svg = device();
        svg.draw_string(&ctx(), 0.0, 0.0, 0.0, "a<b & c").unwrap();
        assert!(svg.contents().contains(">a&lt;b &amp; c</text>"));
    }

    #[test]
    fn test_quote_in_font_family_does_not_end_style_attribute() {
        // Arrange
        let mut svg = device();
        let quoted = DrawingContextValue::builder().font_family("O'Brien Sans").build();

        // Act
        svg.draw_string(&quoted, 0.0, 0.0, 0.0, "x").unwrap();
        svg.draw_circle(&quoted, 0.5, 0.5, 0.1).unwrap();

        // Assert
        let doc = svg.contents();
        assert_eq!(doc.matches("font-family:O&apos;Brien Sans").count(), 2);
        assert!(!doc.contains("O'Brien"));
    }

    #[test]
    fn test_raster_with_ragged_rows_is_rejected() {
        let mut svg = device();
        let result = svg.draw_raster(0.0, 0.0, 1.0, 1.0, &[0; 5], 2, ImageInterpolation::Linear);
        assert!(matches!(result, Err(DeviceError::InvalidArgument(_))));
    }

    #[test]
    fn test_close_writes_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!("griddev-svg-close-{}.svg", std::process::id()));
        let mut svg = SvgDevice::new(&path, 1.0, 1.0);
        svg.open_new_page().unwrap();
        svg.draw_circle(&ctx(), 0.5, 0.5, 0.25).unwrap();

        // Act
        svg.close().unwrap();

        // Assert
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<circle cx='36.000' cy='36.000' r='18.000'/>"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bold_text_is_wider() {
        let svg = device();
        let plain = DrawingContextValue::builder().font_size(12.0).build();
        let bold = DrawingContextValue::builder()
            .font_size(12.0)
            .font_style(FontStyle::Bold)
            .build();
        assert!(svg.string_width(&bold, "abc") > svg.string_width(&plain, "abc"));
    }
}
