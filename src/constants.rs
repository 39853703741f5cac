//! Stable application-wide constants.
//!
//! Values here are structural invariants and domain bounds. They should
//! rarely change. Tuning knobs that benefit from experimentation (weights,
//! cluster counts, model hyperparameters) live in
//! [`EngineConfig`](crate::config::EngineConfig) instead.

// --- Reference city ---

/// Latitude of Luanda, the reference city for accessibility features.
pub const REFERENCE_CITY_LAT: f64 = -8.8390;
/// Longitude of Luanda.
pub const REFERENCE_CITY_LNG: f64 = 13.2894;

// --- Catalog bounds ---

/// Most robust ecosystem rating.
pub const MIN_FRAGILITY: u8 = 1;
/// Most fragile ecosystem rating.
pub const MAX_FRAGILITY: u8 = 5;
/// Default sustainability ceiling applied when a request does not set one.
pub const DEFAULT_MAX_FRAGILITY: u8 = 4;

// --- Route structure ---

/// A route always visits at least this many locations.
pub const MIN_ROUTE_LOCATIONS: usize = 2;
/// Clustering never asks for more than `n / MIN_LOCATIONS_PER_CLUSTER` groups.
pub const MIN_LOCATIONS_PER_CLUSTER: usize = 2;
/// Priority added to members of the anchor cluster when building route variants.
/// Larger than any base priority so the anchor cluster is always drawn first.
pub const ANCHOR_CLUSTER_BONUS: f64 = 100.0;
/// Priority removed per earlier use of a location once a batch has to reuse
/// locations.
pub const REUSE_PENALTY: f64 = 1.0;

// --- Sustainability score normalisers ---

/// Total distance is divided by this before weighting (km).
pub const SCORE_DISTANCE_NORMALISER_KM: f64 = 1_000.0;
/// Total cost is divided by this before weighting (currency units).
pub const SCORE_COST_NORMALISER: f64 = 100_000.0;

// --- Ratings ---

/// Lowest rating a user can give.
pub const MIN_RATING: f64 = 1.0;
/// Highest rating a user can give.
pub const MAX_RATING: f64 = 5.0;
/// Rating assumed for a candidate that has no prediction attached.
pub const NEUTRAL_RATING: f64 = 3.0;

// --- User profiles ---

/// Youngest accepted traveller age.
pub const MIN_PROFILE_AGE: u32 = 18;
/// Oldest accepted traveller age.
pub const MAX_PROFILE_AGE: u32 = 100;
/// Synthetic users are drawn in this age band.
pub const SYNTHETIC_MAX_AGE: u32 = 65;
/// Synthetic budgets are drawn uniformly between these bounds.
pub const SYNTHETIC_MIN_BUDGET: f64 = 10_000.0;
pub const SYNTHETIC_MAX_BUDGET: f64 = 50_000.0;
/// Budget that maps to 1.0 when profiles are normalised for similarity.
pub const PROFILE_BUDGET_NORMALISER: f64 = 50_000.0;
