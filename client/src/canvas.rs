use pilji_engine::{ArtifactData, MemorySurface};
use pilji_shared::{ParcelGeometry, PolygonStyle, Ring};
use web_sys::CanvasRenderingContext2d;

use crate::viewport::Viewport;

const BACKGROUND: &str = "#10131c";
const LABEL_FONT: &str = "600 12px system-ui, sans-serif";
const LABEL_FILL: &str = "#e2e0d8";
const LABEL_HALO: &str = "rgba(16, 19, 28, 0.85)";
const MARKER_FILL: &str = "#f5c542";
const MARKER_BORDER: &str = "#10131c";
const MARKER_RADIUS: f64 = 5.0;

/// Draw every attached artifact of the display list, in creation order.
pub fn draw(
    ctx: &CanvasRenderingContext2d,
    surface: &MemorySurface,
    vp: &Viewport,
    width: f64,
    height: f64,
) {
    ctx.set_fill_style_str(BACKGROUND);
    ctx.fill_rect(0.0, 0.0, width, height);

    for (_, artifact) in surface.attached() {
        match &artifact.data {
            ArtifactData::Polygon { geometry, style } => draw_polygon(ctx, geometry, style, vp),
            ArtifactData::Label { text, at } => draw_label(ctx, text, *at, vp),
            ArtifactData::Marker { at } => draw_marker(ctx, *at, vp),
        }
    }
}

fn trace_ring(ctx: &CanvasRenderingContext2d, ring: &Ring, vp: &Viewport) {
    let mut points = ring.iter();
    let Some(&[lon, lat]) = points.next() else {
        return;
    };
    let (x, y) = vp.world_to_screen(lon, lat);
    ctx.move_to(x, y);
    for &[lon, lat] in points {
        let (x, y) = vp.world_to_screen(lon, lat);
        ctx.line_to(x, y);
    }
    ctx.close_path();
}

fn draw_polygon(
    ctx: &CanvasRenderingContext2d,
    geometry: &ParcelGeometry,
    style: &PolygonStyle,
    vp: &Viewport,
) {
    ctx.begin_path();
    for ring in geometry.rings() {
        trace_ring(ctx, ring, vp);
    }
    if style.has_visible_fill() {
        ctx.set_fill_style_str(&style.fill);
        ctx.fill();
    }
    ctx.set_stroke_style_str(&style.stroke);
    ctx.set_line_width(style.stroke_width);
    ctx.stroke();
}

fn draw_label(ctx: &CanvasRenderingContext2d, text: &str, at: [f64; 2], vp: &Viewport) {
    let (x, y) = vp.world_to_screen(at[0], at[1]);
    ctx.set_font(LABEL_FONT);
    ctx.set_text_align("center");
    ctx.set_line_width(3.0);
    ctx.set_stroke_style_str(LABEL_HALO);
    let _ = ctx.stroke_text(text, x, y);
    ctx.set_fill_style_str(LABEL_FILL);
    let _ = ctx.fill_text(text, x, y);
}

fn draw_marker(ctx: &CanvasRenderingContext2d, at: [f64; 2], vp: &Viewport) {
    let (x, y) = vp.world_to_screen(at[0], at[1]);
    ctx.begin_path();
    let _ = ctx.arc(x, y, MARKER_RADIUS, 0.0, std::f64::consts::TAU);
    ctx.set_fill_style_str(MARKER_FILL);
    ctx.fill();
    ctx.set_stroke_style_str(MARKER_BORDER);
    ctx.set_line_width(1.5);
    ctx.stroke();
}
