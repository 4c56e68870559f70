//! Pointer-driven shape capture.
//!
//! Turns map clicks into exactly one [`FinalizedShape`]:
//!
//! - **Rectangle**: click a corner, click the opposite corner.
//! - **Circle**: click the center, click a point on the rim.
//! - **Polygon**: click each vertex, double-click to close (needs 3+ vertices).
//!
//! Completing a shape drops back to [`DrawingMode::None`]. Selecting the mode
//! that is already active cancels drawing. Only the most recent shape is kept.
//!
//! After every call [`ShapeCapture::hint`] describes what a map layer should
//! overlay (markers and dashed preview edges). The hint is purely visual.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::shape::{Bounds, FinalizedShape, LatLon, MIN_POLYGON_VERTICES};

/// Active drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawingMode {
    #[default]
    None,
    Rectangle,
    Circle,
    Polygon,
}

impl DrawingMode {
    pub fn name(&self) -> &'static str {
        match self {
            DrawingMode::None => "None",
            DrawingMode::Rectangle => "Rectangle",
            DrawingMode::Circle => "Circle",
            DrawingMode::Polygon => "Polygon",
        }
    }

    pub fn is_drawing(&self) -> bool {
        !matches!(self, DrawingMode::None)
    }
}

/// Points collected for the shape in progress.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PendingCapture {
    #[default]
    Empty,
    /// Rectangle: first corner placed.
    Corner(LatLon),
    /// Circle: center placed.
    Center(LatLon),
    /// Polygon: vertices in click order.
    Vertices(Vec<LatLon>),
}

impl PendingCapture {
    pub fn is_empty(&self) -> bool {
        match self {
            PendingCapture::Empty => true,
            PendingCapture::Vertices(v) => v.is_empty(),
            _ => false,
        }
    }
}

/// Overlay for the shape in progress.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderHint {
    /// Corner, center or vertex markers.
    pub markers: Vec<LatLon>,
    /// Dashed edges between consecutive polygon vertices (closing edge included once valid).
    pub preview_edges: Vec<(LatLon, LatLon)>,
}

impl RenderHint {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.preview_edges.is_empty()
    }
}

/// Result of a double-click.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClickOutcome {
    pub completed: Option<FinalizedShape>,
    /// The map's own double-click behaviour (zoom) must not run.
    pub consumed: bool,
}

/// Drawing session state machine.
#[derive(Debug, Default)]
pub struct ShapeCapture {
    mode: DrawingMode,
    pending: PendingCapture,
    finalized: Option<FinalizedShape>,
    hint: RenderHint,
}

impl ShapeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> DrawingMode {
        self.mode
    }

    pub fn pending(&self) -> &PendingCapture {
        &self.pending
    }

    /// Most recently completed shape.
    pub fn finalized(&self) -> Option<&FinalizedShape> {
        self.finalized.as_ref()
    }

    pub fn hint(&self) -> &RenderHint {
        &self.hint
    }

    /// Switch drawing tool. Selecting the active tool again cancels drawing.
    /// Any capture in progress is discarded.
    pub fn set_mode(&mut self, mode: DrawingMode) {
        let next = if mode == self.mode { DrawingMode::None } else { mode };
        if !self.pending.is_empty() {
            debug!("Discarding {} capture in progress", self.mode.name());
        }
        self.mode = next;
        self.pending = match next {
            DrawingMode::Polygon => PendingCapture::Vertices(Vec::new()),
            _ => PendingCapture::Empty,
        };
        self.refresh_hint();
        trace!("Drawing mode -> {}", next.name());
    }

    /// Cancel drawing without emitting anything. The last finished shape stays.
    pub fn clear(&mut self) {
        self.mode = DrawingMode::None;
        self.pending = PendingCapture::Empty;
        self.refresh_hint();
    }

    /// Forget the retained shape as well.
    pub fn clear_all(&mut self) {
        self.clear();
        self.finalized = None;
    }

    /// Single click on the map. Returns the shape if this click completed one.
    pub fn on_map_click(&mut self, point: LatLon) -> Option<FinalizedShape> {
        let pending = std::mem::take(&mut self.pending);
        let (next, completed) = match (self.mode, pending) {
            (DrawingMode::None, _) => (PendingCapture::Empty, None),

            (DrawingMode::Rectangle, PendingCapture::Corner(corner)) => {
                let bounds = Bounds::from_corners(corner, point);
                (PendingCapture::Empty, Some(FinalizedShape::Rectangle { bounds }))
            }
            (DrawingMode::Rectangle, _) => (PendingCapture::Corner(point), None),

            (DrawingMode::Circle, PendingCapture::Center(center)) => {
                let radius_meters = center.distance_to(&point);
                (
                    PendingCapture::Empty,
                    Some(FinalizedShape::Circle { center, radius_meters }),
                )
            }
            (DrawingMode::Circle, _) => (PendingCapture::Center(point), None),

            (DrawingMode::Polygon, PendingCapture::Vertices(mut vertices)) => {
                vertices.push(point);
                (PendingCapture::Vertices(vertices), None)
            }
            (DrawingMode::Polygon, _) => (PendingCapture::Vertices(vec![point]), None),
        };
        self.pending = next;

        if let Some(shape) = &completed {
            self.complete(shape.clone());
        } else {
            self.refresh_hint();
        }
        completed
    }

    /// Double click on the map. Closes a polygon with enough vertices; anything
    /// else leaves the state untouched.
    pub fn on_map_double_click(&mut self, _point: LatLon) -> ClickOutcome {
        let PendingCapture::Vertices(vertices) = &self.pending else {
            return ClickOutcome::default();
        };
        if self.mode != DrawingMode::Polygon || vertices.len() < MIN_POLYGON_VERTICES {
            trace!("Double-click ignored ({} vertices)", vertices.len());
            return ClickOutcome::default();
        }

        let shape = FinalizedShape::Polygon {
            vertices: vertices.clone(),
        };
        self.complete(shape.clone());
        ClickOutcome {
            completed: Some(shape),
            consumed: true,
        }
    }

    fn complete(&mut self, shape: FinalizedShape) {
        debug!("Captured {}", shape.name());
        self.finalized = Some(shape);
        self.mode = DrawingMode::None;
        self.pending = PendingCapture::Empty;
        self.refresh_hint();
    }

    fn refresh_hint(&mut self) {
        self.hint = match &self.pending {
            PendingCapture::Empty => RenderHint::default(),
            PendingCapture::Corner(p) | PendingCapture::Center(p) => RenderHint {
                markers: vec![*p],
                preview_edges: Vec::new(),
            },
            PendingCapture::Vertices(vertices) => {
                let mut edges: Vec<(LatLon, LatLon)> =
                    vertices.windows(2).map(|w| (w[0], w[1])).collect();
                if vertices.len() >= MIN_POLYGON_VERTICES {
                    edges.push((vertices[vertices.len() - 1], vertices[0]));
                }
                RenderHint {
                    markers: vertices.clone(),
                    preview_edges: edges,
                }
            }
        };
    }
}
