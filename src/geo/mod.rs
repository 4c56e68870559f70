//! Map-side geometry: drawing shapes and turning them into planner regions.

pub mod capture;
pub mod region;
pub mod shape;

pub use capture::{ClickOutcome, DrawingMode, PendingCapture, RenderHint, ShapeCapture};
pub use region::{SelectionRegion, resolve};
pub use shape::{Bounds, EARTH_RADIUS_M, FinalizedShape, LatLon, MIN_POLYGON_VERTICES};
