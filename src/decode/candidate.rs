/// Pixel coordinate in frame space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest rectangle containing every point. Empty input yields a zero box.
    pub fn enclosing(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Self {
            left: min_x,
            top: min_y,
            width: max_x.abs_diff(min_x),
            height: max_y.abs_diff(min_y),
        }
    }

    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width as i32)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height as i32)
    }
}

/// One decoded symbol. Lives for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedCandidate {
    /// Decoded payload text.
    pub text: String,
    /// Symbol outline as reported by the backend (four corners for QR).
    pub polygon: Vec<Point>,
    pub rect: BoundingBox,
}

impl DecodedCandidate {
    pub fn new(text: impl Into<String>, polygon: Vec<Point>) -> Self {
        let rect = BoundingBox::enclosing(&polygon);
        Self {
            text: text.into(),
            polygon,
            rect,
        }
    }
}
