use serde::{Deserialize, Serialize};

/// A single coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The effectively unbounded rectangle reported by sources that cannot
    /// compute a precise extent.
    pub fn unbounded() -> Self {
        Self {
            min_x: -(f32::MAX as f64),
            min_y: -(f32::MAX as f64),
            max_x: f32::MAX as f64,
            max_y: f32::MAX as f64,
        }
    }

    fn from_point(point: Point) -> Self {
        Self {
            min_x: point.x,
            min_y: point.y,
            max_x: point.x,
            max_y: point.y,
        }
    }

    fn expand(&mut self, point: Point) {
        if point.x < self.min_x {
            self.min_x = point.x;
        }
        if point.x > self.max_x {
            self.max_x = point.x;
        }
        if point.y < self.min_y {
            self.min_y = point.y;
        }
        if point.y > self.max_y {
            self.max_y = point.y;
        }
    }
}

/// The geometry carried by a shape record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    /// No drawable geometry; iteration skips these records.
    Null,
    Point,
    Line,
    Polygon,
}

/// One feature record produced by a data source: geometry parts, the
/// bounding box over all coordinates, and the attribute values matching the
/// layer's item schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub parts: Vec<Vec<Point>>,
    pub bounds: Option<Rect>,
    pub values: Vec<String>,
    pub index: i64,
}

impl Shape {
    pub fn null() -> Self {
        Self {
            kind: ShapeKind::Null,
            parts: Vec::new(),
            bounds: None,
            values: Vec::new(),
            index: -1,
        }
    }

    pub fn is_null(&self) -> bool {
        self.kind == ShapeKind::Null
    }

    pub fn add_part(&mut self, part: Vec<Point>) {
        self.parts.push(part);
    }

    /// Recompute the bounding box over every coordinate in every part.
    pub fn compute_bounds(&mut self) {
        let mut bounds: Option<Rect> = None;
        for part in &self.parts {
            for point in part {
                match bounds.as_mut() {
                    Some(rect) => rect.expand(*point),
                    None => bounds = Some(Rect::from_point(*point)),
                }
            }
        }
        self.bounds = bounds;
    }
}
