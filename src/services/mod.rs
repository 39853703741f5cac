pub mod clustering;
pub mod features;
pub mod route_optimizer;
pub mod statistics;

pub use clustering::{ClusterAssignment, ClusterSummary, ClusteringEngine};
pub use features::{EngineeredFeatures, FeatureEngineer, FeatureTable};
pub use route_optimizer::{Candidate, RouteConstraints, RouteOptimizer};
pub use statistics::CatalogStatistics;
