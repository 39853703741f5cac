pub mod coordinates;
pub mod location;
pub mod profile;
pub mod route;

pub use coordinates::{path_distance_km, Coordinates};
pub use location::{EcosystemType, Location};
pub use profile::UserProfile;
pub use route::{Route, RouteBatch, RouteDetail, RouteMetrics, RouteMode, RouteStop, RouteSummary};
