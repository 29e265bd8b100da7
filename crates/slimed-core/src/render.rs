use crate::geom::Rect;

/// RGB color. Alpha handling is the backend's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

pub const COL_BG: Color = Color(20, 20, 35);
pub const COL_ACCENT_1: Color = Color(0, 234, 255);
pub const COL_ACCENT_2: Color = Color(255, 0, 85);
pub const COL_ACCENT_3: Color = Color(255, 215, 0);
pub const COL_TEXT: Color = Color(240, 240, 255);

/// Drawing capability provided by the windowed client. Coordinates are
/// virtual-playfield pixels, already camera-adjusted by the caller. The
/// simulation never sees pixel data; sprite frames are addressed by sheet
/// name, action name, and frame index.
pub trait Renderer {
    fn draw_frame(
        &mut self,
        sheet: &str,
        action: &str,
        frame: usize,
        x: f32,
        y: f32,
        flip_x: bool,
    );

    fn draw_rect(&mut self, rect: Rect, color: Color, filled: bool);

    fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color, filled: bool);

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color);

    fn draw_polygon(&mut self, points: &[(f32, f32)], color: Color);

    fn draw_text(&mut self, text: &str, x: f32, y: f32, color: Color);
}

/// Renderer that discards every call. Lets update/draw paths run in tests
/// and headless tools.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn draw_frame(&mut self, _: &str, _: &str, _: usize, _: f32, _: f32, _: bool) {}
    fn draw_rect(&mut self, _: Rect, _: Color, _: bool) {}
    fn draw_circle(&mut self, _: f32, _: f32, _: f32, _: Color, _: bool) {}
    fn draw_line(&mut self, _: f32, _: f32, _: f32, _: f32, _: Color) {}
    fn draw_polygon(&mut self, _: &[(f32, f32)], _: Color) {}
    fn draw_text(&mut self, _: &str, _: f32, _: f32, _: Color) {}
}
