//! Pan/zoom transform between screen and world coordinates.
//!
//! `screen = world * zoom + (x, y)`.

use serde::{Deserialize, Serialize};

use crate::node::{Node, Position, Size};

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 3.0;
/// Step used by the zoom in/out buttons.
pub const ZOOM_STEP: f64 = 1.2;
const WHEEL_ZOOM_IN: f64 = 1.1;
const WHEEL_ZOOM_OUT: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
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
    pub fn new(x: f64, y: f64, zoom: f64) -> Self {
        Self {
            x,
            y,
            zoom: clamp_zoom(zoom),
        }
    }

    pub fn pan(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn screen_to_world(&self, screen: Position) -> Position {
        (screen - self.pan()) / self.zoom
    }

    pub fn world_to_screen(&self, world: Position) -> Position {
        world * self.zoom + self.pan()
    }

    /// Scale by `factor` keeping the world point under `anchor` fixed on screen.
    pub fn zoom_at(&self, anchor: Position, factor: f64) -> Viewport {
        if !factor.is_finite() || factor <= 0.0 {
            return *self;
        }
        let zoom = clamp_zoom(self.zoom * factor);
        let pan = anchor - (anchor - self.pan()) * (zoom / self.zoom);
        Viewport {
            x: pan.x,
            y: pan.y,
            zoom,
        }
    }

    /// Wheel zoom: scrolling down (positive delta) zooms out.
    pub fn wheel_zoom(&self, anchor: Position, delta_y: f64) -> Viewport {
        let factor = if delta_y > 0.0 {
            WHEEL_ZOOM_OUT
        } else {
            WHEEL_ZOOM_IN
        };
        self.zoom_at(anchor, factor)
    }

    pub fn pan_by(&self, delta: Position) -> Viewport {
        Viewport {
            x: self.x + delta.x,
            y: self.y + delta.y,
            zoom: self.zoom,
        }
    }

    pub fn zoom_in(&self) -> Viewport {
        Viewport {
            zoom: clamp_zoom(self.zoom * ZOOM_STEP),
            ..*self
        }
    }

    pub fn zoom_out(&self) -> Viewport {
        Viewport {
            zoom: clamp_zoom(self.zoom / ZOOM_STEP),
            ..*self
        }
    }

    pub fn reset(&self) -> Viewport {
        Viewport::default()
    }

    /// Frame every node inside a viewport of `viewport_size` screen pixels.
    ///
    /// Never zooms in past 1. Empty or zero-area content leaves the
    /// viewport untouched.
    pub fn fit_to_content<'a>(
        &self,
        nodes: impl IntoIterator<Item = &'a Node>,
        viewport_size: Size,
        padding: f64,
    ) -> Viewport {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        let mut any = false;

        for node in nodes {
            let far = node.far_corner();
            min_x = min_x.min(node.position.x);
            min_y = min_y.min(node.position.y);
            max_x = max_x.max(far.x);
            max_y = max_y.max(far.y);
            any = true;
        }

        if !any {
            return *self;
        }

        let content_w = max_x - min_x;
        let content_h = max_y - min_y;
        if content_w <= 0.0 || content_h <= 0.0 {
            return *self;
        }

        let scale_x = (viewport_size.width - padding) / content_w;
        let scale_y = (viewport_size.height - padding) / content_h;
        let zoom = clamp_zoom(scale_x.min(scale_y).min(1.0));

        let center = Position::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
        Viewport {
            x: viewport_size.width / 2.0 - center.x * zoom,
            y: viewport_size.height / 2.0 - center.y * zoom,
            zoom,
        }
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() {
        return 1.0;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}
