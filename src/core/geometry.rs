use serde::{Deserialize, Serialize};
use tracing::warn;

/// Side length of the virtual grid layout providers report boxes on.
pub const LAYOUT_GRID: f64 = 1000.0;

/// Which coordinate convention a source box is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Absolute pixels of the rendered page raster.
    Pixel,
    /// Resolution independent 0..1000 grid.
    Grid1000,
}

/// Provider box as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

impl From<[f64; 4]> for BBox {
    fn from(value: [f64; 4]) -> Self {
        Self::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(value: BBox) -> Self {
        [value.x0, value.y0, value.x1, value.y1]
    }
}

/// Pixel frame of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    /// Returns `None` for a page that has not been rendered yet.
    pub fn new(width: Option<u32>, height: Option<u32>) -> Option<Self> {
        match (width, height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Some(Self { width, height }),
            _ => None,
        }
    }
}

/// Page relative rectangle, every component a fraction of the page size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FractionRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl FractionRect {
    pub fn is_within_unit(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.left)
            && unit.contains(&self.top)
            && unit.contains(&self.width)
            && unit.contains(&self.height)
            && self.left + self.width <= 1.0 + f64::EPSILON
            && self.top + self.height <= 1.0 + f64::EPSILON
    }

    /// `[left, top, width, height]` as CSS percentages.
    pub fn to_percent(&self) -> [f64; 4] {
        [
            self.left * 100.0,
            self.top * 100.0,
            self.width * 100.0,
            self.height * 100.0,
        ]
    }
}

/// Converts a provider box into page fractions.
///
/// Grid boxes never need the page size. Pixel boxes need it and yield `None`
/// while the page has no dimensions. Results are not clamped: a rectangle
/// outside the unit square means the backend sent bad coordinates.
pub fn normalize(bbox: BBox, space: CoordinateSpace, page: Option<PageSize>) -> Option<FractionRect> {
    let (sx, sy) = match space {
        CoordinateSpace::Grid1000 => (LAYOUT_GRID, LAYOUT_GRID),
        CoordinateSpace::Pixel => {
            let page = page?;
            (f64::from(page.width), f64::from(page.height))
        }
    };

    let rect = FractionRect {
        left: bbox.x0 / sx,
        top: bbox.y0 / sy,
        width: bbox.width() / sx,
        height: bbox.height() / sy,
    };
    if !rect.is_within_unit() {
        warn!(?bbox, ?space, ?rect, "normalized box falls outside the page");
    }
    Some(rect)
}
