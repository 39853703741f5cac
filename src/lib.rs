// Library exports for testing and reusability

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod ml;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use engine::{EngineStatus, RankedCandidate, RecommendationEngine};
pub use error::{AppError, ErrorKind, Result};
