//! Personalization subsystem: synthetic training corpus, gradient-boosted
//! rating model and the collaborative filter built over the same corpus.

pub mod collaborative;
pub mod gbdt;
pub mod rating;
pub mod synthetic;

pub use collaborative::{CollaborativeFilter, Neighbor};
pub use rating::{FeatureImportance, ModelDiagnostics, RatingPredictor};
pub use synthetic::{Interaction, SyntheticCorpus, SyntheticUser};
