//! Rectangle geometry for ROI selection and cropping.
//!
//! Coordinates are real-valued so resize tracking can carry sub-pixel
//! positions. Extents may go negative in the middle of a resize; callers
//! restore the invariant with [`Rect::normalise`].

use serde::{Deserialize, Serialize};

/// Border or corner of a [`Rect`], used to pick a resize direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
    None,
}

impl Edge {
    /// Every real edge and corner.
    pub const ALL: [Edge; 8] = [
        Edge::N,
        Edge::S,
        Edge::E,
        Edge::W,
        Edge::NE,
        Edge::NW,
        Edge::SE,
        Edge::SW,
    ];

    /// Whether resizing in this direction moves the left border.
    pub fn moves_left(self) -> bool {
        matches!(self, Edge::W | Edge::NW | Edge::SW)
    }

    /// Whether resizing in this direction moves the right border.
    pub fn moves_right(self) -> bool {
        matches!(self, Edge::E | Edge::NE | Edge::SE)
    }

    /// Whether resizing in this direction moves the top border.
    pub fn moves_top(self) -> bool {
        matches!(self, Edge::N | Edge::NE | Edge::NW)
    }

    /// Whether resizing in this direction moves the bottom border.
    pub fn moves_bottom(self) -> bool {
        matches!(self, Edge::S | Edge::SE | Edge::SW)
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Clip `value` into `[lower, upper]`. Unlike `f64::clamp` this never
/// panics when `upper < lower`; the lower bound wins.
pub fn clip(lower: f64, value: f64, upper: f64) -> f64 {
    value.min(upper).max(lower)
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A rect of the given size centred at `(cx, cy)`.
    pub fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// True when the rect covers no area.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Point-in-rect over the half-open bounds `[left, right) x [top, bottom)`.
    pub fn includes_point(&self, x: f64, y: f64) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// Flip negative extents so the rect covers the same bounds with
    /// non-negative width and height.
    pub fn normalise(&mut self) {
        if self.width < 0.0 {
            self.left += self.width;
            self.width = -self.width;
        }
        if self.height < 0.0 {
            self.top += self.height;
            self.height = -self.height;
        }
    }

    /// By-value form of [`Rect::normalise`].
    pub fn normalised(mut self) -> Self {
        self.normalise();
        self
    }

    /// Overlap of two rects. Disjoint rects give a zero-area result.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let a = self.normalised();
        let b = other.normalised();

        let (left, width) = overlap(a.left, a.width, b.left, b.width);
        let (top, height) = overlap(a.top, a.height, b.top, b.height);

        Rect::new(left, top, width, height)
    }

    /// Move the rect so it lies within `bounds`, keeping its size where
    /// possible. A rect larger than `bounds` is pinned to the top-left.
    pub fn clamp_within(&self, bounds: &Rect) -> Rect {
        let left = clip(bounds.left, self.left, bounds.right() - self.width);
        let top = clip(bounds.top, self.top, bounds.bottom() - self.height);
        Rect::new(left, top, self.width, self.height)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.width, self.height)
    }

    /// Multiply every coordinate by `factor`.
    pub fn scale(&self, factor: f64) -> Rect {
        Rect::new(
            self.left * factor,
            self.top * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// The point that an edge or corner resizes around: the corner point
    /// itself, or the midpoint of a side.
    pub fn anchor(&self, edge: Edge) -> Option<(f64, f64)> {
        let (cx, cy) = self.center();
        let point = match edge {
            Edge::NW => (self.left, self.top),
            Edge::NE => (self.right(), self.top),
            Edge::SW => (self.left, self.bottom()),
            Edge::SE => (self.right(), self.bottom()),
            Edge::N => (cx, self.top),
            Edge::S => (cx, self.bottom()),
            Edge::W => (self.left, cy),
            Edge::E => (self.right(), cy),
            Edge::None => return None,
        };
        Some(point)
    }

    /// The `2 * margin` square grab handle around an edge or corner anchor.
    pub fn handle(&self, edge: Edge, margin: f64) -> Option<Rect> {
        self.anchor(edge)
            .map(|(x, y)| Rect::centered(x, y, 2.0 * margin, 2.0 * margin))
    }

    /// Find the edge or corner whose hit zone contains `(x, y)`.
    ///
    /// A hit zone is the band within `margin` of a border, on either side.
    /// Corner zones take priority over side zones; among several candidate
    /// corners (or sides) the nearest wins. Points farther than `margin`
    /// from every border give [`Edge::None`].
    pub fn which_corner(&self, margin: f64, x: f64, y: f64) -> Edge {
        let r = self.normalised();

        let distance_to_border = [
            segment_distance(x, y, (r.left, r.top), (r.right(), r.top)),
            segment_distance(x, y, (r.left, r.bottom()), (r.right(), r.bottom())),
            segment_distance(x, y, (r.left, r.top), (r.left, r.bottom())),
            segment_distance(x, y, (r.right(), r.top), (r.right(), r.bottom())),
        ]
        .into_iter()
        .fold(f64::INFINITY, f64::min);

        if distance_to_border.is_nan() || distance_to_border > margin {
            return Edge::None;
        }

        let corner = [Edge::NW, Edge::NE, Edge::SW, Edge::SE]
            .into_iter()
            .filter_map(|edge| {
                let (cx, cy) = r.anchor(edge)?;
                let in_zone = (x - cx).abs() <= margin && (y - cy).abs() <= margin;
                in_zone.then(|| (edge, (x - cx).hypot(y - cy)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((edge, _)) = corner {
            return edge;
        }

        let within_x = x >= r.left && x <= r.right();
        let within_y = y >= r.top && y <= r.bottom();
        let sides = [
            (Edge::N, within_x, (y - r.top).abs()),
            (Edge::S, within_x, (y - r.bottom()).abs()),
            (Edge::W, within_y, (x - r.left).abs()),
            (Edge::E, within_y, (x - r.right()).abs()),
        ];

        sides
            .into_iter()
            .filter(|(_, along, distance)| *along && *distance <= margin)
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(edge, _, _)| edge)
            .unwrap_or(Edge::None)
    }

    /// The four bands (top, right, bottom, left) of an outline `width`
    /// pixels either side of the border, for drawing the selection frame.
    pub fn outline(&self, width: f64) -> [Rect; 4] {
        let inner_height = (self.height - width * 2.0).max(0.0);
        [
            Rect::new(
                self.left - width,
                self.top - width,
                self.width + width * 2.0,
                width * 2.0,
            ),
            Rect::new(
                self.right() - width,
                self.top + width,
                width * 2.0,
                inner_height,
            ),
            Rect::new(
                self.left - width,
                self.bottom() - width,
                self.width + width * 2.0,
                width * 2.0,
            ),
            Rect::new(
                self.left - width,
                self.top + width,
                width * 2.0,
                inner_height,
            ),
        ]
    }
}

/// Overlap of two 1-D spans as `(start, extent)`. When the overlap is one
/// of the inputs its extent is returned as-is so no rounding creeps in.
fn overlap(a0: f64, a_len: f64, b0: f64, b_len: f64) -> (f64, f64) {
    let start = a0.max(b0);
    let end = (a0 + a_len).min(b0 + b_len);
    let extent = if start == a0 && end == a0 + a_len {
        a_len
    } else if start == b0 && end == b0 + b_len {
        b_len
    } else {
        end - start
    };
    (start, extent.max(0.0))
}

/// Euclidean distance from `(x, y)` to the segment `a`-`b`.
fn segment_distance(x: f64, y: f64, a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq > 0.0 {
        (((x - a.0) * dx + (y - a.1) * dy) / length_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (x - (a.0 + t * dx)).hypot(y - (a.1 + t * dy))
}
