//! Node geometry helpers
//!
//! Everything here honours the size fallback rule: a node without an
//! explicit width/height uses its type's registry size.

use serde::{Deserialize, Serialize};

use crate::registry::NodeShape;
use crate::types::{Node, Position};

/// Axis-aligned rectangle in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanned by two corner points in any order
    pub fn from_corners(a: Position, b: Position) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    /// Flip negative extents so width and height are non-negative
    pub fn normalized(self) -> Self {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self { x, y, width, height }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Position {
        Position::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether two rectangles overlap (touching edges count)
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() <= other.right()
            && self.right() >= other.left()
            && self.top() <= other.bottom()
            && self.bottom() >= other.top()
    }

    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.left()
            && point.x <= self.right()
            && point.y >= self.top()
            && point.y <= self.bottom()
    }

    /// Grow the rectangle by `amount` on every side
    pub fn inflate(&self, amount: f64) -> Self {
        Self {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + amount * 2.0,
            height: self.height + amount * 2.0,
        }
    }
}

/// Effective bounding rectangle of a node
pub fn node_bounds(node: &Node) -> Rect {
    let size = node.size();
    Rect::new(node.x, node.y, size.width, size.height)
}

/// Center point of a node
pub fn node_center(node: &Node) -> Position {
    node_bounds(node).center()
}

/// Connection attachment points on a node's edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Top,
    Right,
    Bottom,
    Left,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [Anchor::Top, Anchor::Right, Anchor::Bottom, Anchor::Left];
}

/// Position of one anchor on a node
pub fn anchor_point(node: &Node, anchor: Anchor) -> Position {
    let bounds = node_bounds(node);
    let center = bounds.center();
    match anchor {
        Anchor::Top => Position::new(center.x, bounds.top()),
        Anchor::Right => Position::new(bounds.right(), center.y),
        Anchor::Bottom => Position::new(center.x, bounds.bottom()),
        Anchor::Left => Position::new(bounds.left(), center.y),
    }
}

/// The anchor of `node` nearest to `point`
///
/// Ties resolve in top, right, bottom, left order.
pub fn closest_anchor(node: &Node, point: Position) -> (Anchor, Position) {
    let mut best = (Anchor::Top, anchor_point(node, Anchor::Top));
    let mut best_distance = distance(best.1, point);
    for anchor in &Anchor::ALL[1..] {
        let candidate = anchor_point(node, *anchor);
        let d = distance(candidate, point);
        if d < best_distance {
            best = (*anchor, candidate);
            best_distance = d;
        }
    }
    best
}

pub fn distance(a: Position, b: Position) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Shape-aware point containment
///
/// Circles use the node width as diameter, diamonds test the rhombus
/// inscribed in the bounds, and every other shape uses its bounds.
pub fn contains_point(node: &Node, point: Position) -> bool {
    let bounds = node_bounds(node);
    let center = bounds.center();
    match node.node_type.spec().shape {
        NodeShape::Circle => distance(center, point) <= bounds.width / 2.0,
        NodeShape::Diamond => {
            let half_w = bounds.width / 2.0;
            let half_h = bounds.height / 2.0;
            if half_w <= 0.0 || half_h <= 0.0 {
                return false;
            }
            (point.x - center.x).abs() / half_w + (point.y - center.y).abs() / half_h <= 1.0
        }
        _ => bounds.contains(point),
    }
}

/// Topmost node under a point (later nodes are drawn above earlier ones)
pub fn hit_test(nodes: &[Node], point: Position) -> Option<&Node> {
    nodes.iter().rev().find(|n| contains_point(n, point))
}

/// Smallest rectangle enclosing every node, or `None` for an empty set
pub fn bounding_box<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Option<Rect> {
    let mut iter = nodes.into_iter().map(node_bounds);
    let first = iter.next()?;
    let (mut left, mut top, mut right, mut bottom) =
        (first.left(), first.top(), first.right(), first.bottom());
    for rect in iter {
        left = left.min(rect.left());
        top = top.min(rect.top());
        right = right.max(rect.right());
        bottom = bottom.max(rect.bottom());
    }
    Some(Rect::new(left, top, right - left, bottom - top))
}
