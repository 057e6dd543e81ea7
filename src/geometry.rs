use serde::{Deserialize, Serialize};

/// Bounding box as returned by the detection model, in percent (0-100) of the
/// image it was shown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

/// Axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer pixel bounds used for cropping and compositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Where the image is laid out on screen, in display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// Clamps the rectangle into `[0, width] x [0, height]`. Returns `None` when
    /// nothing of positive area is left.
    pub fn clamp_to(&self, width: f64, height: f64) -> Option<Self> {
        let x1 = self.x.clamp(0.0, width);
        let y1 = self.y.clamp(0.0, height);
        let x2 = (self.x + self.width).clamp(0.0, width);
        let y2 = (self.y + self.height).clamp(0.0, height);
        if !(x2 > x1 && y2 > y1) {
            return None;
        }
        Some(Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Snaps to whole pixels inside a `max_width x max_height` raster. The
    /// result is at least 1x1 as long as the raster is non-empty.
    pub fn to_bounds(&self, max_width: u32, max_height: u32) -> Option<PixelBounds> {
        if max_width == 0 || max_height == 0 {
            return None;
        }
        let x = (self.x.floor().max(0.0) as u32).min(max_width - 1);
        let y = (self.y.floor().max(0.0) as u32).min(max_height - 1);
        let width = (self.width.round().max(1.0) as u32).min(max_width - x);
        let height = (self.height.round().max(1.0) as u32).min(max_height - y);
        Some(PixelBounds {
            x,
            y,
            width,
            height,
        })
    }
}

impl PercentBox {
    /// Puts the edges in order and into `[0,100]`.
    pub fn normalized(&self) -> Self {
        let (ymin, ymax) = ordered(clamp_percent(self.ymin), clamp_percent(self.ymax));
        let (xmin, xmax) = ordered(clamp_percent(self.xmin), clamp_percent(self.xmax));
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.ymax > self.ymin && self.xmax > self.xmin)
    }
}

/// Grows the box by `ratio` of its own size on every side, then clamps to
/// `[0,100]`. Model boxes tend to clip bubble borders and tails.
pub fn pad_percent_box(raw: &PercentBox, ratio: f64) -> PercentBox {
    let b = raw.normalized();
    let pad_y = (b.ymax - b.ymin) * ratio;
    let pad_x = (b.xmax - b.xmin) * ratio;
    PercentBox {
        ymin: clamp_percent(b.ymin - pad_y),
        xmin: clamp_percent(b.xmin - pad_x),
        ymax: clamp_percent(b.ymax + pad_y),
        xmax: clamp_percent(b.xmax + pad_x),
    }
}

pub fn percent_to_chunk_pixels(b: &PercentBox, chunk_width: f64, chunk_height: f64) -> PixelRect {
    PixelRect {
        x: b.xmin / 100.0 * chunk_width,
        y: b.ymin / 100.0 * chunk_height,
        width: (b.xmax - b.xmin) / 100.0 * chunk_width,
        height: (b.ymax - b.ymin) / 100.0 * chunk_height,
    }
}

/// Chunks are vertical slices, so only y moves.
pub fn chunk_to_image(rect: &PixelRect, chunk_y_offset: f64) -> PixelRect {
    PixelRect {
        y: rect.y + chunk_y_offset,
        ..*rect
    }
}

pub fn image_to_chunk(rect: &PixelRect, chunk_y_offset: f64) -> PixelRect {
    PixelRect {
        y: rect.y - chunk_y_offset,
        ..*rect
    }
}

pub fn image_to_percent(rect: &PixelRect, width: f64, height: f64) -> PercentBox {
    if width <= 0.0 || height <= 0.0 {
        return PercentBox {
            ymin: 0.0,
            xmin: 0.0,
            ymax: 0.0,
            xmax: 0.0,
        };
    }
    PercentBox {
        ymin: rect.y / height * 100.0,
        xmin: rect.x / width * 100.0,
        ymax: (rect.y + rect.height) / height * 100.0,
        xmax: (rect.x + rect.width) / width * 100.0,
    }
}

/// Maps a pointer position in display units to image pixels, independent of how
/// large the image is laid out.
pub fn display_to_image(
    pointer: Point,
    display: &DisplayRect,
    image_width: f64,
    image_height: f64,
) -> Point {
    let scale_x = if display.width > 0.0 {
        image_width / display.width
    } else {
        1.0
    };
    let scale_y = if display.height > 0.0 {
        image_height / display.height
    } else {
        1.0
    };
    Point {
        x: (pointer.x - display.left) * scale_x,
        y: (pointer.y - display.top) * scale_y,
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}
