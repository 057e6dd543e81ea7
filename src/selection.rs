use crate::geometry::{self, DisplayRect, PixelRect, Point};

pub const MIN_SELECTION_SIZE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Drawing { anchor: Point, current: Point },
}

/// Turns pointer drags over the displayed image into rectangles in image
/// pixels.
#[derive(Debug, Clone)]
pub struct SelectionTool {
    state: DragState,
    min_size: f64,
}

impl Default for SelectionTool {
    fn default() -> Self {
        Self::new(MIN_SELECTION_SIZE)
    }
}

impl SelectionTool {
    pub fn new(min_size: f64) -> Self {
        Self {
            state: DragState::Idle,
            min_size,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn min_size(&self) -> f64 {
        self.min_size
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, DragState::Drawing { .. })
    }

    pub fn begin(&mut self, pointer: Point, display: &DisplayRect, image_size: (u32, u32)) {
        let position = to_image(pointer, display, image_size);
        self.state = DragState::Drawing {
            anchor: position,
            current: position,
        };
    }

    pub fn update(&mut self, pointer: Point, display: &DisplayRect, image_size: (u32, u32)) {
        if let DragState::Drawing { current, .. } = &mut self.state {
            *current = to_image(pointer, display, image_size);
        }
    }

    /// The rectangle being dragged, for drawing a live preview.
    pub fn preview(&self) -> Option<PixelRect> {
        match self.state {
            DragState::Idle => None,
            DragState::Drawing { anchor, current } => {
                Some(PixelRect::from_corners(anchor, current))
            }
        }
    }

    /// Ends the drag. Returns the rectangle when both sides exceed the minimum
    /// size; tiny drags are treated as clicks and dropped.
    pub fn finish(&mut self) -> Option<PixelRect> {
        let previous = std::mem::replace(&mut self.state, DragState::Idle);
        let DragState::Drawing { anchor, current } = previous else {
            return None;
        };
        let rect = PixelRect::from_corners(anchor, current);
        if rect.width > self.min_size && rect.height > self.min_size {
            Some(rect)
        } else {
            None
        }
    }

    /// The pointer left the image; same as releasing it.
    pub fn leave(&mut self) -> Option<PixelRect> {
        self.finish()
    }
}

/// Pointer positions past an image edge pin to that edge, so the size check in
/// `finish` sees the rectangle that would actually be committed.
fn to_image(pointer: Point, display: &DisplayRect, image_size: (u32, u32)) -> Point {
    let (width, height) = (image_size.0 as f64, image_size.1 as f64);
    let mapped = geometry::display_to_image(pointer, display, width, height);
    Point {
        x: clamp_axis(mapped.x, width),
        y: clamp_axis(mapped.y, height),
    }
}

fn clamp_axis(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max.max(0.0))
    }
}
