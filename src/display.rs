//! Render-resolution and display-placement maths.
//!
//! The shader renders at its own resolution, which is either fixed or a
//! fraction of the window; the result is then drawn into the window scaled
//! by the display scale and offset by the pan. All of this is plain
//! arithmetic over window coordinates (y-down, origin top-left, same space
//! wgpu viewports and winit cursor positions use), kept free of GPU types
//! so it can be tested directly.

use glam::Vec2;

pub const DEFAULT_RENDER_WIDTH: u32 = 640;
pub const DEFAULT_RENDER_HEIGHT: u32 = 360;
pub const DEFAULT_WINDOW_SCALE: f32 = 0.5;

/// How the render resolution is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderSize {
    /// A fixed resolution, independent of the window.
    Fixed { width: u32, height: u32 },
    /// A fraction of the current window size.
    WindowRelative(f32),
}

/// Render resolution, display scale and pan for one window.
pub struct DisplayOptions {
    render_size: RenderSize,
    fit_width: bool,
    fit_height: bool,
    scale: f32,
    pan: Vec2,
    window_width: u32,
    window_height: u32,
}

impl DisplayOptions {
    pub fn new(window_width: u32, window_height: u32) -> Self {
        let mut options = Self {
            render_size: RenderSize::Fixed {
                width: DEFAULT_RENDER_WIDTH,
                height: DEFAULT_RENDER_HEIGHT,
            },
            fit_width: false,
            fit_height: false,
            scale: 1.0,
            pan: Vec2::ZERO,
            window_width,
            window_height,
        };
        options.recenter();
        options
    }

    pub fn render_width(&self) -> u32 {
        match self.render_size {
            RenderSize::Fixed { width, .. } => width.max(1),
            RenderSize::WindowRelative(s) => ((self.window_width as f32 * s) as u32).max(1),
        }
    }

    pub fn render_height(&self) -> u32 {
        match self.render_size {
            RenderSize::Fixed { height, .. } => height.max(1),
            RenderSize::WindowRelative(s) => ((self.window_height as f32 * s) as u32).max(1),
        }
    }

    pub fn display_width(&self) -> f32 {
        self.render_width() as f32 * self.scale
    }

    pub fn display_height(&self) -> f32 {
        self.render_height() as f32 * self.scale
    }

    pub fn display_scale(&self) -> f32 {
        self.scale
    }

    pub fn pan(&self) -> Vec2 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: Vec2) {
        self.pan = pan;
    }

    /// Sets the display scale directly, without adjusting the pan. Drag
    /// zooming recomputes both from values captured at press time.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// The smallest allowed display scale: never below four pixels in the
    /// smaller render dimension.
    pub fn min_scale(&self) -> f32 {
        4.0 / self.render_width().min(self.render_height()) as f32
    }

    /// Switches to a fixed render resolution, keeping the display centred on
    /// the same point.
    pub fn set_fixed_render_resolution(&mut self, width: u32, height: u32) {
        let old = Vec2::new(self.display_width(), self.display_height());
        self.render_size = RenderSize::Fixed { width, height };
        self.compensate_pan(old);
    }

    /// Switches to a window-relative render resolution, keeping the display
    /// centred on the same point.
    pub fn set_relative_render_resolution(&mut self, window_scale: f32) {
        let old = Vec2::new(self.display_width(), self.display_height());
        self.render_size = RenderSize::WindowRelative(window_scale);
        self.compensate_pan(old);
    }

    pub fn render_size(&self) -> RenderSize {
        self.render_size
    }

    /// Sets the fit mode and explicit scale. Fit modes recompute the scale
    /// from the window and recentre; an explicit scale keeps the display
    /// centred where it was.
    pub fn set_display_options(&mut self, fit_width: bool, fit_height: bool, scale: f32) {
        let old = Vec2::new(self.display_width(), self.display_height());

        self.fit_width = fit_width;
        self.fit_height = fit_height;
        self.scale = if fit_width {
            self.window_width as f32 / self.render_width() as f32
        } else if fit_height {
            self.window_height as f32 / self.render_height() as f32
        } else {
            scale
        };

        if fit_width || fit_height {
            self.recenter();
        } else {
            self.compensate_pan(old);
        }
    }

    /// Records the new window size, recomputing fit scales.
    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.window_width = width;
        self.window_height = height;
        if self.fit_width {
            self.scale = width as f32 / self.render_width() as f32;
            self.recenter();
        } else if self.fit_height {
            self.scale = height as f32 / self.render_height() as f32;
            self.recenter();
        }
    }

    /// Centres the display in the window.
    pub fn recenter(&mut self) {
        self.pan = Vec2::new(
            (self.window_width as f32 - self.display_width()) * 0.5,
            (self.window_height as f32 - self.display_height()) * 0.5,
        );
    }

    /// Rescales about `anchor` (window coordinates), so the render-space
    /// point under the anchor stays put. Scale is clamped so the display
    /// never drops below four pixels in its smaller dimension.
    pub fn zoom(&mut self, anchor: Vec2, new_scale: f32) {
        let new_scale = new_scale.max(self.min_scale());
        let relative = new_scale / self.scale;
        self.pan = (self.pan - anchor) * relative + anchor;
        self.scale = new_scale;
    }

    /// The rectangle the rendered image occupies in the window: (origin,
    /// size).
    pub fn display_rect(&self) -> (Vec2, Vec2) {
        (
            self.pan,
            Vec2::new(self.display_width(), self.display_height()),
        )
    }

    /// Maps a window position to render-resolution pixel coordinates, the
    /// space `iMouse` and `fragCoord` share.
    pub fn window_to_render(&self, pos: Vec2) -> Vec2 {
        let render = Vec2::new(self.render_width() as f32, self.render_height() as f32);
        let display = Vec2::new(self.display_width(), self.display_height());
        (pos - self.pan) / display * render
    }

    fn compensate_pan(&mut self, old_display: Vec2) {
        let new_display = Vec2::new(self.display_width(), self.display_height());
        self.pan -= (new_display - old_display) * 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_render_size_ignores_the_window() {
        let mut options = DisplayOptions::new(1920, 1080);
        options.set_fixed_render_resolution(800, 450);
        options.window_resized(640, 480);
        assert_eq!(options.render_width(), 800);
        assert_eq!(options.render_height(), 450);
    }

    #[test]
    fn relative_render_size_follows_the_window() {
        let mut options = DisplayOptions::new(1000, 600);
        options.set_relative_render_resolution(0.5);
        assert_eq!(options.render_width(), 500);
        assert_eq!(options.render_height(), 300);
        options.window_resized(800, 400);
        assert_eq!(options.render_width(), 400);
        assert_eq!(options.render_height(), 200);
    }

    #[test]
    fn fit_width_fills_the_window_horizontally() {
        let mut options = DisplayOptions::new(1280, 720);
        options.set_fixed_render_resolution(640, 360);
        options.set_display_options(true, false, 0.0);
        assert_eq!(options.display_width(), 1280.0);
        let (origin, _) = options.display_rect();
        assert_eq!(origin.x, 0.0);
    }

    #[test]
    fn recenter_centres_the_display() {
        let mut options = DisplayOptions::new(1000, 800);
        options.set_fixed_render_resolution(400, 200);
        options.set_display_options(false, false, 1.0);
        options.recenter();
        let (origin, size) = options.display_rect();
        assert_eq!(origin.x + size.x * 0.5, 500.0);
        assert_eq!(origin.y + size.y * 0.5, 400.0);
    }

    #[test]
    fn zoom_keeps_the_anchor_point_fixed() {
        let mut options = DisplayOptions::new(1000, 800);
        options.set_fixed_render_resolution(500, 400);
        let anchor = Vec2::new(330.0, 270.0);
        let before = options.window_to_render(anchor);
        options.zoom(anchor, options.display_scale() * 1.5);
        let after = options.window_to_render(anchor);
        assert!((before - after).length() < 1e-3, "{before} vs {after}");
    }

    #[test]
    fn zoom_clamps_at_the_minimum_scale() {
        let mut options = DisplayOptions::new(1000, 800);
        options.set_fixed_render_resolution(400, 200);
        options.zoom(Vec2::ZERO, 1e-6);
        assert!((options.display_scale() - 4.0 / 200.0).abs() < 1e-6);
    }

    #[test]
    fn window_to_render_maps_the_display_corners() {
        let mut options = DisplayOptions::new(1000, 800);
        options.set_fixed_render_resolution(500, 400);
        options.set_display_options(false, false, 1.0);
        options.set_pan(Vec2::new(100.0, 50.0));
        let top_left = options.window_to_render(Vec2::new(100.0, 50.0));
        assert_eq!(top_left, Vec2::ZERO);
        let bottom_right = options.window_to_render(Vec2::new(600.0, 450.0));
        assert_eq!(bottom_right, Vec2::new(500.0, 400.0));
    }
}
