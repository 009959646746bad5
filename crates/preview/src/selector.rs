//! Interactive ROI selection.
//!
//! The selector tracks a rectangle in display coordinates (the scaled-down
//! preview image) and reports it in source-frame coordinates. Pointer input
//! drives a three-state machine:
//!
//! ```text
//!            down on edge/corner            move: resize edges
//!   ┌──────┐ ───────────────────▶ ┌────────┐ ◀──┐
//!   │ Wait │                      │ Resize │ ───┘
//!   └──────┘ ◀─────── up ──────── └────────┘
//!     │  ▲
//!     │  └────────── up ───────── ┌──────┐ ◀──┐
//!     └── down inside ──────────▶ │ Drag │ ───┘ move: reposition
//!                                 └──────┘
//! ```
//!
//! A press with no selection creates a minimum-size box under the pointer
//! and enters `Resize` on its south-east corner, so press-and-drag draws a
//! new box. A press outside an existing box hides it.

use std::sync::{Arc, Mutex};

use turnscan_common::config::PreviewDefaults;
use turnscan_scan_model::geometry::{clip, Edge, Rect};

/// Fixed parameters of the selector.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Size of the edge/corner hit zone, in display pixels. The minimum
    /// selection size is three times this.
    pub corner_margin: f64,

    /// Display-to-source scale (display = source * scale).
    pub display_scale: f64,

    /// Size of the preview image in display pixels.
    pub display_width: f64,
    pub display_height: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self::from(&PreviewDefaults::default())
    }
}

impl From<&PreviewDefaults> for SelectorConfig {
    fn from(preview: &PreviewDefaults) -> Self {
        Self {
            corner_margin: preview.corner_margin,
            display_scale: preview.display_scale,
            display_width: preview.display_width,
            display_height: preview.display_height,
        }
    }
}

/// Current interaction state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionState {
    /// No button held.
    Wait,
    /// Moving the whole selection; `offset` is pointer minus origin.
    Drag { offset: (f64, f64) },
    /// Moving the edges named by `direction`; `offset` is pointer minus
    /// the anchor of that edge or corner.
    Resize { direction: Edge, offset: (f64, f64) },
}

/// Cursor the host should show while hovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    Default,
    Move,
    Resize(Edge),
}

/// Shared, locked view of the current selection in source coordinates.
///
/// The selector publishes after every change; readers on other threads
/// take one consistent snapshot per call.
#[derive(Debug, Clone, Default)]
pub struct SelectionHandle {
    inner: Arc<Mutex<Option<Rect>>>,
}

impl SelectionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the selection, if one is visible.
    pub fn get(&self) -> Option<Rect> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, selection: Option<Rect>) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = selection;
    }
}

/// The ROI drag/resize state machine.
#[derive(Debug)]
pub struct RegionSelector {
    config: SelectorConfig,
    area: Rect,
    visible: bool,
    state: SelectionState,
    handle: SelectionHandle,
}

impl RegionSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            area: Rect::default(),
            visible: false,
            state: SelectionState::Wait,
            handle: SelectionHandle::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SelectorConfig::default())
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// A clone of the shared selection handle.
    pub fn handle(&self) -> SelectionHandle {
        self.handle.clone()
    }

    /// The preview image as a rect in display coordinates.
    pub fn display_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.config.display_width, self.config.display_height)
    }

    /// Minimum selection extent on each axis.
    pub fn min_size(&self) -> f64 {
        3.0 * self.config.corner_margin
    }

    /// The selection in display coordinates, if visible.
    pub fn display_selection(&self) -> Option<Rect> {
        self.visible.then_some(self.area)
    }

    /// The selection in source-frame coordinates, if visible.
    pub fn current_selection(&self) -> Option<Rect> {
        self.display_selection()
            .map(|area| area.scale(1.0 / self.config.display_scale))
    }

    /// Replace the selection with `area` (display coordinates), e.g. to
    /// restore a saved ROI.
    pub fn set_display_selection(&mut self, area: Rect) {
        self.area = area.normalised().intersection(&self.display_bounds());
        self.visible = !self.area.is_empty();
        self.state = SelectionState::Wait;
        self.publish();
    }

    /// Hide the selection.
    pub fn clear(&mut self) {
        self.visible = false;
        self.state = SelectionState::Wait;
        self.publish();
    }

    /// Resize the display, re-clipping any selection to the new bounds.
    pub fn set_display_size(&mut self, width: f64, height: f64) {
        self.config.display_width = width.max(0.0);
        self.config.display_height = height.max(0.0);
        if self.visible {
            self.area = self.area.intersection(&self.display_bounds());
            self.visible = !self.area.is_empty();
        }
        self.publish();
    }

    pub fn on_pointer_down(&mut self, x: f64, y: f64) {
        let (x, y) = self.clamp_point(x, y);

        match self.state {
            SelectionState::Wait if !self.visible => {
                let size = self.min_size();
                let bounds = self.display_bounds();
                // A display narrower than the minimum box truncates it.
                self.area = Rect::new(x - size, y - size, size, size)
                    .clamp_within(&bounds)
                    .intersection(&bounds);
                if self.area.is_empty() {
                    return;
                }
                self.visible = true;
                self.state = SelectionState::Resize {
                    direction: Edge::SE,
                    offset: (x - self.area.right(), y - self.area.bottom()),
                };
                tracing::trace!(area = ?self.area, "Selection created");
            }
            SelectionState::Wait => {
                let direction = self.area.which_corner(self.config.corner_margin, x, y);
                if let Some((ax, ay)) = self.area.anchor(direction) {
                    self.state = SelectionState::Resize {
                        direction,
                        offset: (x - ax, y - ay),
                    };
                } else if self.area.includes_point(x, y) {
                    self.state = SelectionState::Drag {
                        offset: (x - self.area.left, y - self.area.top),
                    };
                } else {
                    self.visible = false;
                    tracing::trace!("Selection hidden");
                }
            }
            // A second press while a button is held changes nothing.
            SelectionState::Drag { .. } | SelectionState::Resize { .. } => {}
        }

        self.publish();
    }

    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        let (x, y) = self.clamp_point(x, y);

        match self.state {
            SelectionState::Wait => return,
            SelectionState::Drag { offset } => {
                let moved = Rect::new(x - offset.0, y - offset.1, self.area.width, self.area.height);
                self.area = moved.clamp_within(&self.display_bounds());
            }
            SelectionState::Resize { direction, offset } => {
                self.area = self.resized(direction, x - offset.0, y - offset.1);
            }
        }

        self.publish();
    }

    pub fn on_pointer_up(&mut self) {
        self.state = SelectionState::Wait;
    }

    /// Cursor to show when hovering at `(x, y)` with no button held.
    pub fn hover_cursor(&self, x: f64, y: f64) -> CursorShape {
        if !self.visible || self.state != SelectionState::Wait {
            return CursorShape::Default;
        }
        let (x, y) = self.clamp_point(x, y);
        match self.area.which_corner(self.config.corner_margin, x, y) {
            Edge::None if self.area.includes_point(x, y) => CursorShape::Move,
            Edge::None => CursorShape::Default,
            edge => CursorShape::Resize(edge),
        }
    }

    /// Move the edges implied by `direction` to the anchor position
    /// `(ax, ay)`, never letting the selection shrink below the minimum.
    fn resized(&self, direction: Edge, ax: f64, ay: f64) -> Rect {
        let min = self.min_size();
        let mut area = self.area;

        if direction.moves_right() {
            area.width = (ax - area.left).max(min);
        }
        if direction.moves_bottom() {
            area.height = (ay - area.top).max(min);
        }
        if direction.moves_left() {
            let right = area.right();
            let left = ax.min(right - min);
            area.width = right - left;
            area.left = left;
        }
        if direction.moves_top() {
            let bottom = area.bottom();
            let top = ay.min(bottom - min);
            area.height = bottom - top;
            area.top = top;
        }

        area.normalise();
        area.intersection(&self.display_bounds())
    }

    fn clamp_point(&self, x: f64, y: f64) -> (f64, f64) {
        let x = if x.is_finite() { x } else { 0.0 };
        let y = if y.is_finite() { y } else { 0.0 };
        (
            clip(0.0, x, self.config.display_width),
            clip(0.0, y, self.config.display_height),
        )
    }

    fn publish(&self) {
        self.handle.publish(self.current_selection());
    }
}
