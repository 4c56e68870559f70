//! Planning service client: wire types and the HTTP implementation.

mod http;
pub mod types;

pub use http::{ClientError, ClientResult, HttpPlanningClient, PlanningService};
pub use types::{
    AreaStats, ExportFile, ExportFormat, NetworkType, PathFeature, RouteResult, RouteStats,
    RouteSummary, SegmentedRoute,
};
