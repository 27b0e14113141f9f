/// Pan/zoom transformation between lon/lat world space and screen pixels.
/// Latitude grows northward, screen y grows downward, hence the y flip.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale: f64,
}

/// Pixels per degree. At Korean latitudes one parcel spans on the order of
/// 1e-4 degrees, so the default shows a neighborhood-sized area.
const DEFAULT_SCALE: f64 = 400_000.0;
const MIN_SCALE: f64 = 2_000.0;
const MAX_SCALE: f64 = 40_000_000.0;
const ZOOM_SENSITIVITY: f64 = 0.001;

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: DEFAULT_SCALE,
        }
    }
}

impl Viewport {
    /// Viewport centered on a world coordinate.
    pub fn centered_on(lon: f64, lat: f64, canvas_w: f64, canvas_h: f64) -> Self {
        let mut vp = Self::default();
        vp.offset_x = canvas_w / 2.0 - lon * vp.scale;
        vp.offset_y = canvas_h / 2.0 + lat * vp.scale;
        vp
    }

    pub fn world_to_screen(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            lon * self.scale + self.offset_x,
            -lat * self.scale + self.offset_y,
        )
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> (f64, f64) {
        (
            (sx - self.offset_x) / self.scale,
            -(sy - self.offset_y) / self.scale,
        )
    }

    /// Zoom toward a focus point (screen coordinates).
    pub fn zoom_at(&mut self, delta: f64, screen_x: f64, screen_y: f64) {
        let factor = (-delta * ZOOM_SENSITIVITY).exp();
        let new_scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        let ratio = new_scale / self.scale;

        // Keep the point under the cursor fixed.
        self.offset_x = screen_x - (screen_x - self.offset_x) * ratio;
        self.offset_y = screen_y - (screen_y - self.offset_y) * ratio;
        self.scale = new_scale;
    }

    /// Pan by screen-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Fit `[min_lon, min_lat, max_lon, max_lat]` with padding.
    pub fn fit_bounds(&mut self, bounds: [f64; 4], canvas_w: f64, canvas_h: f64) {
        let [min_lon, min_lat, max_lon, max_lat] = bounds;
        let world_w = max_lon - min_lon;
        let world_h = max_lat - min_lat;

        if canvas_w <= 0.0 || canvas_h <= 0.0 || world_w < 0.0 || world_h < 0.0 {
            return;
        }

        // Degenerate bounds (a single parcel collapses to near a point):
        // center on it at a parcel-friendly zoom.
        if world_w <= f64::EPSILON || world_h <= f64::EPSILON {
            let center_lon = (min_lon + max_lon) / 2.0;
            let center_lat = (min_lat + max_lat) / 2.0;
            self.scale = DEFAULT_SCALE.clamp(MIN_SCALE, MAX_SCALE);
            self.offset_x = canvas_w / 2.0 - center_lon * self.scale;
            self.offset_y = canvas_h / 2.0 + center_lat * self.scale;
            return;
        }

        let padding = 0.15;
        let scale_x = canvas_w / (world_w * (1.0 + padding * 2.0));
        let scale_y = canvas_h / (world_h * (1.0 + padding * 2.0));
        self.scale = scale_x.min(scale_y).clamp(MIN_SCALE, MAX_SCALE);

        let center_lon = (min_lon + max_lon) / 2.0;
        let center_lat = (min_lat + max_lat) / 2.0;
        self.offset_x = canvas_w / 2.0 - center_lon * self.scale;
        self.offset_y = canvas_h / 2.0 + center_lat * self.scale;
    }
}

#[cfg(test)]
mod tests {
    use super::Viewport;

    #[test]
    fn screen_world_round_trip() {
        let vp = Viewport::centered_on(126.978, 37.566, 1280.0, 720.0);
        let (sx, sy) = vp.world_to_screen(126.978, 37.566);
        assert!((sx - 640.0).abs() < 1e-9);
        assert!((sy - 360.0).abs() < 1e-9);

        let (lon, lat) = vp.screen_to_world(sx, sy);
        assert!((lon - 126.978).abs() < 1e-12);
        assert!((lat - 37.566).abs() < 1e-12);
    }

    #[test]
    fn north_is_up() {
        let vp = Viewport::default();
        let (_, y_south) = vp.world_to_screen(127.0, 37.0);
        let (_, y_north) = vp.world_to_screen(127.0, 38.0);
        assert!(y_north < y_south);
    }

    #[test]
    fn zoom_keeps_the_cursor_point_fixed() {
        let mut vp = Viewport::centered_on(126.978, 37.566, 1280.0, 720.0);
        let (before_lon, before_lat) = vp.screen_to_world(200.0, 150.0);
        vp.zoom_at(-480.0, 200.0, 150.0);
        let (after_lon, after_lat) = vp.screen_to_world(200.0, 150.0);

        assert!((before_lon - after_lon).abs() < 1e-9);
        assert!((before_lat - after_lat).abs() < 1e-9);
        assert!(vp.scale > Viewport::default().scale);
    }

    #[test]
    fn fit_bounds_contains_the_bounds() {
        let mut vp = Viewport::default();
        vp.fit_bounds([126.97, 37.56, 126.99, 37.58], 1280.0, 720.0);

        for (lon, lat) in [(126.97, 37.56), (126.99, 37.58)] {
            let (sx, sy) = vp.world_to_screen(lon, lat);
            assert!((0.0..=1280.0).contains(&sx), "x {sx} out of canvas");
            assert!((0.0..=720.0).contains(&sy), "y {sy} out of canvas");
        }
    }

    #[test]
    fn fit_bounds_handles_degenerate_extent() {
        let mut vp = Viewport::default();
        vp.fit_bounds([126.978, 37.566, 126.978, 37.566], 1280.0, 720.0);
        let (sx, sy) = vp.world_to_screen(126.978, 37.566);
        assert!((sx - 640.0).abs() < 1e-6);
        assert!((sy - 360.0).abs() < 1e-6);
    }
}
