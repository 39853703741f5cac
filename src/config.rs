use crate::constants::*;
use crate::models::{Coordinates, UserProfile};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_CATALOG_PATH: &str = "data/angola_catalog.json";

/// Read `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr + ToString,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("Invalid {}", key))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_path: PathBuf,
    /// Train the personalization model right after the catalog is loaded
    pub train_on_startup: bool,
    /// Where the trained model is kept between runs. Loaded when the file
    /// exists, otherwise written after training.
    pub model_path: Option<PathBuf>,
    /// Profile used by the binary to request personalized routes
    pub profile: UserProfile,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        Ok(Config {
            catalog_path: env::var("ECOROUTE_CATALOG_PATH")
                .unwrap_or_else(|_| DEFAULT_CATALOG_PATH.to_string())
                .into(),
            train_on_startup: env_or("ECOROUTE_TRAIN_ON_STARTUP", true)?,
            model_path: env::var("ECOROUTE_MODEL_PATH").ok().map(PathBuf::from),
            profile: profile_from_env()?,
            engine: EngineConfig::from_env()?,
        })
    }
}

fn profile_from_env() -> Result<UserProfile, String> {
    let profile = UserProfile::new(
        env_or("ECOROUTE_PROFILE_AGE", 30u32)?,
        env_or("ECOROUTE_PROFILE_MAX_BUDGET", 20_000.0)?,
        env_or("ECOROUTE_PROFILE_SUSTAINABILITY", 0.8)?,
        env_or("ECOROUTE_PROFILE_ADVENTURE", 0.6)?,
        env_or("ECOROUTE_PROFILE_CULTURE", 0.7)?,
    );
    profile.validate()?;
    Ok(profile)
}

/// Everything the recommendation engine needs besides the catalog itself.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub route: RouteConfig,
    pub clustering: ClusteringConfig,
    pub features: FeatureWeights,
    pub ml: MlConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            route: RouteConfig::from_env()?,
            clustering: ClusteringConfig::from_env()?,
            features: FeatureWeights::from_env()?,
            ml: MlConfig::from_env()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Accessibility is measured from this point
    pub reference_point: Coordinates,

    pub default_max_budget: f64,
    pub default_max_locations: usize,
    pub default_max_fragility: u8,
    pub default_num_routes: usize,

    /// Soft cap on locations drawn from one cluster into a single route
    pub max_per_cluster: usize,

    /// In ML mode a single location may cost at most this share of the budget
    pub max_fee_share_per_location: f64,

    pub score_weights: ScoreWeights,
}

/// Weights of the sustainability score (lower score is better).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub fragility: f64,
    pub distance: f64,
    pub cost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            fragility: 0.45,
            distance: 0.35,
            cost: 0.20,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            reference_point: Coordinates {
                lat: REFERENCE_CITY_LAT,
                lng: REFERENCE_CITY_LNG,
            },
            default_max_budget: 20_000.0,
            default_max_locations: 6,
            default_max_fragility: DEFAULT_MAX_FRAGILITY,
            default_num_routes: 5,
            max_per_cluster: 2,
            max_fee_share_per_location: 0.4,
            score_weights: ScoreWeights::default(),
        }
    }
}

impl RouteConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let reference_point = Coordinates::new(
            env_or("ECOROUTE_REFERENCE_LAT", defaults.reference_point.lat)?,
            env_or("ECOROUTE_REFERENCE_LNG", defaults.reference_point.lng)?,
        )?;

        let default_max_fragility: u8 =
            env_or("ECOROUTE_DEFAULT_MAX_FRAGILITY", defaults.default_max_fragility)?;
        if !(MIN_FRAGILITY..=MAX_FRAGILITY).contains(&default_max_fragility) {
            return Err(format!(
                "ECOROUTE_DEFAULT_MAX_FRAGILITY must be between {} and {}",
                MIN_FRAGILITY, MAX_FRAGILITY
            ));
        }

        let max_fee_share_per_location: f64 = env_or(
            "ECOROUTE_MAX_FEE_SHARE_PER_LOCATION",
            defaults.max_fee_share_per_location,
        )?;
        if !(max_fee_share_per_location > 0.0 && max_fee_share_per_location <= 1.0) {
            return Err("ECOROUTE_MAX_FEE_SHARE_PER_LOCATION must be in (0, 1]".to_string());
        }

        Ok(Self {
            reference_point,
            default_max_budget: env_or("ECOROUTE_DEFAULT_MAX_BUDGET", defaults.default_max_budget)?,
            default_max_locations: env_or(
                "ECOROUTE_DEFAULT_MAX_LOCATIONS",
                defaults.default_max_locations,
            )?,
            default_max_fragility,
            default_num_routes: env_or("ECOROUTE_DEFAULT_NUM_ROUTES", defaults.default_num_routes)?,
            max_per_cluster: env_or("ECOROUTE_MAX_PER_CLUSTER", defaults.max_per_cluster)?,
            max_fee_share_per_location,
            score_weights: ScoreWeights {
                fragility: env_or(
                    "ECOROUTE_SCORE_WEIGHT_FRAGILITY",
                    defaults.score_weights.fragility,
                )?,
                distance: env_or(
                    "ECOROUTE_SCORE_WEIGHT_DISTANCE",
                    defaults.score_weights.distance,
                )?,
                cost: env_or("ECOROUTE_SCORE_WEIGHT_COST", defaults.score_weights.cost)?,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Requested number of clusters; shrunk for small catalogs
    pub cluster_count: usize,
    pub seed: u64,
    /// Independent k-means restarts; the best inertia wins
    pub runs: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            cluster_count: 6,
            seed: 42,
            runs: 10,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

impl ClusteringConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let cluster_count: usize = env_or("ECOROUTE_CLUSTER_COUNT", defaults.cluster_count)?;
        if cluster_count == 0 {
            return Err("ECOROUTE_CLUSTER_COUNT must be at least 1".to_string());
        }

        Ok(Self {
            cluster_count,
            seed: env_or("ECOROUTE_CLUSTER_SEED", defaults.seed)?,
            runs: env_or("ECOROUTE_CLUSTER_RUNS", defaults.runs)?,
            max_iterations: env_or("ECOROUTE_CLUSTER_MAX_ITERATIONS", defaults.max_iterations)?,
            tolerance: env_or("ECOROUTE_CLUSTER_TOLERANCE", defaults.tolerance)?,
        })
    }
}

/// Weights of the composite attractiveness feature. They sum to 1.0 so the
/// composite stays in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub sustainability: f64,
    pub capacity: f64,
    pub popularity: f64,
    pub accessibility: f64,
    pub cost: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            sustainability: 0.3,
            capacity: 0.2,
            popularity: 0.2,
            accessibility: 0.2,
            cost: 0.1,
        }
    }
}

impl FeatureWeights {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let weights = Self {
            sustainability: env_or(
                "ECOROUTE_FEATURE_WEIGHT_SUSTAINABILITY",
                defaults.sustainability,
            )?,
            capacity: env_or("ECOROUTE_FEATURE_WEIGHT_CAPACITY", defaults.capacity)?,
            popularity: env_or("ECOROUTE_FEATURE_WEIGHT_POPULARITY", defaults.popularity)?,
            accessibility: env_or(
                "ECOROUTE_FEATURE_WEIGHT_ACCESSIBILITY",
                defaults.accessibility,
            )?,
            cost: env_or("ECOROUTE_FEATURE_WEIGHT_COST", defaults.cost)?,
        };

        if (weights.total() - 1.0).abs() > 1e-6 {
            return Err(format!(
                "Feature weights must sum to 1.0 (got {:.3})",
                weights.total()
            ));
        }
        Ok(weights)
    }

    pub fn total(&self) -> f64 {
        self.sustainability + self.capacity + self.popularity + self.accessibility + self.cost
    }
}

#[derive(Debug, Clone)]
pub struct MlConfig {
    /// Number of synthetic users generated by `train_ml` when none is given
    pub corpus_size: usize,
    pub corpus_seed: u64,
    pub min_visits_per_user: usize,
    pub max_visits_per_user: usize,

    /// Synthetic users consulted by the collaborative filter
    pub neighbors: usize,
    /// Ratings at or above this count as a recommendation signal
    pub high_rating_threshold: f64,
    /// Length of the collaborative recommendation list
    pub recommendations: usize,
    /// Bonus added to the predicted rating of the top collaborative pick,
    /// decaying linearly down the list
    pub collaborative_bonus: f64,

    pub hyperparameters: Hyperparameters,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            corpus_size: 1_000,
            corpus_seed: 42,
            min_visits_per_user: 3,
            max_visits_per_user: 15,
            neighbors: 20,
            high_rating_threshold: 4.0,
            recommendations: 10,
            collaborative_bonus: 0.5,
            hyperparameters: Hyperparameters::default(),
        }
    }
}

impl MlConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let min_visits_per_user: usize =
            env_or("ECOROUTE_MIN_VISITS_PER_USER", defaults.min_visits_per_user)?;
        let max_visits_per_user: usize =
            env_or("ECOROUTE_MAX_VISITS_PER_USER", defaults.max_visits_per_user)?;
        if min_visits_per_user == 0 || min_visits_per_user > max_visits_per_user {
            return Err(
                "ECOROUTE_MIN_VISITS_PER_USER must be >= 1 and <= ECOROUTE_MAX_VISITS_PER_USER"
                    .to_string(),
            );
        }

        Ok(Self {
            corpus_size: env_or("ECOROUTE_CORPUS_SIZE", defaults.corpus_size)?,
            corpus_seed: env_or("ECOROUTE_CORPUS_SEED", defaults.corpus_seed)?,
            min_visits_per_user,
            max_visits_per_user,
            neighbors: env_or("ECOROUTE_CF_NEIGHBORS", defaults.neighbors)?,
            high_rating_threshold: env_or(
                "ECOROUTE_CF_HIGH_RATING_THRESHOLD",
                defaults.high_rating_threshold,
            )?,
            recommendations: env_or("ECOROUTE_CF_RECOMMENDATIONS", defaults.recommendations)?,
            collaborative_bonus: env_or("ECOROUTE_CF_BONUS", defaults.collaborative_bonus)?,
            hyperparameters: Hyperparameters::from_env()?,
        })
    }
}

/// Gradient boosting hyperparameters. Training is a pure function of these
/// values and the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_trees: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of training rows sampled for each tree
    pub subsample: f64,
    /// Histogram bins per feature when searching splits
    pub n_bins: usize,
    /// Fraction of rows held out to compute diagnostics
    pub validation_fraction: f64,
    pub seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_leaf: 5,
            subsample: 0.8,
            n_bins: 32,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl Hyperparameters {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let params = Self {
            n_trees: env_or("ECOROUTE_GB_TREES", defaults.n_trees)?,
            learning_rate: env_or("ECOROUTE_GB_LEARNING_RATE", defaults.learning_rate)?,
            max_depth: env_or("ECOROUTE_GB_MAX_DEPTH", defaults.max_depth)?,
            min_samples_leaf: env_or("ECOROUTE_GB_MIN_SAMPLES_LEAF", defaults.min_samples_leaf)?,
            subsample: env_or("ECOROUTE_GB_SUBSAMPLE", defaults.subsample)?,
            n_bins: env_or("ECOROUTE_GB_BINS", defaults.n_bins)?,
            validation_fraction: env_or(
                "ECOROUTE_GB_VALIDATION_FRACTION",
                defaults.validation_fraction,
            )?,
            seed: env_or("ECOROUTE_GB_SEED", defaults.seed)?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.n_trees == 0 {
            return Err("n_trees must be at least 1".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err("learning_rate must be in (0, 1]".to_string());
        }
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }
        if self.min_samples_leaf == 0 {
            return Err("min_samples_leaf must be at least 1".to_string());
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err("subsample must be in (0, 1]".to_string());
        }
        if !(2..=1024).contains(&self.n_bins) {
            return Err("n_bins must be between 2 and 1024".to_string());
        }
        if !(0.0..0.9).contains(&self.validation_fraction) {
            return Err("validation_fraction must be in [0, 0.9)".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_feature_weights_sum_to_one() {
        assert!((FeatureWeights::default().total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_score_weights() {
        let weights = ScoreWeights::default();
        assert_eq!(weights.fragility, 0.45);
        assert_eq!(weights.distance, 0.35);
        assert_eq!(weights.cost, 0.20);
    }

    #[test]
    fn test_hyperparameter_validation() {
        assert!(Hyperparameters::default().validate().is_ok());

        let mut params = Hyperparameters::default();
        params.n_trees = 0;
        assert!(params.validate().is_err());

        let mut params = Hyperparameters::default();
        params.learning_rate = 0.0;
        assert!(params.validate().is_err());

        let mut params = Hyperparameters::default();
        params.subsample = 1.5;
        assert!(params.validate().is_err());

        let mut params = Hyperparameters::default();
        params.validation_fraction = 0.95;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_route_config_defaults() {
        let config = RouteConfig::default();
        assert_eq!(config.default_max_fragility, DEFAULT_MAX_FRAGILITY);
        assert_eq!(config.max_per_cluster, 2);
        assert_eq!(config.reference_point.lat, REFERENCE_CITY_LAT);
    }
}
