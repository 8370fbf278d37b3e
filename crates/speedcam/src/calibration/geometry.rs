use crate::models::ImagePoint;

/// Below this many square pixels a quadrilateral is treated as collapsed.
const MIN_AREA: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadShape {
    Convex,
    /// Concave or self-intersecting.
    NonConvex,
    /// Collinear corners or (near) zero area.
    Degenerate,
}

/// Shoelace area; positive for counter-clockwise order in a y-up frame.
pub fn signed_area(points: &[ImagePoint]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

fn cross(o: ImagePoint, a: ImagePoint, b: ImagePoint) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Classifies the polygon in recorded order.
pub fn classify(points: &[ImagePoint; 4]) -> QuadShape {
    let turns: Vec<f64> = (0..4)
        .map(|i| cross(points[i], points[(i + 1) % 4], points[(i + 2) % 4]))
        .collect();

    if turns.iter().any(|t| t.abs() < f64::EPSILON) {
        return QuadShape::Degenerate;
    }
    if !(turns.iter().all(|t| *t > 0.0) || turns.iter().all(|t| *t < 0.0)) {
        return QuadShape::NonConvex;
    }
    if signed_area(points).abs() < MIN_AREA {
        QuadShape::Degenerate
    } else {
        QuadShape::Convex
    }
}
