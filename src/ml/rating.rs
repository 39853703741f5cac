use crate::config::Hyperparameters;
use crate::constants::{MAX_RATING, MIN_RATING, NEUTRAL_RATING};
use crate::error::{AppError, Result};
use crate::ml::gbdt::GradientBoostedRegressor;
use crate::ml::synthetic::SyntheticCorpus;
use crate::models::UserProfile;
use crate::services::features::{EngineeredFeatures, FeatureTable};
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

/// Column names of the model input, in order. Profile fields come first,
/// then location features, then the fee-to-budget interaction.
pub const FEATURE_SCHEMA: [&str; 17] = [
    "user_age",
    "user_max_budget",
    "user_sustainability",
    "user_adventure",
    "user_culture",
    "location_sustainability",
    "location_accessibility",
    "location_popularity",
    "location_relative_capacity",
    "location_relative_cost",
    "location_composite",
    "location_entry_fee",
    "location_fragility",
    "location_ecosystem",
    "location_adventure_affinity",
    "location_culture_affinity",
    "fee_to_budget",
];

/// Model input row for one (profile, location) pair.
pub fn feature_row(profile: &UserProfile, features: &EngineeredFeatures) -> [f64; 17] {
    let fee_to_budget = if profile.max_budget > 0.0 {
        features.entry_fee / profile.max_budget
    } else {
        0.0
    };
    [
        profile.age as f64,
        profile.max_budget,
        profile.sustainability,
        profile.adventure,
        profile.culture,
        features.sustainability,
        features.accessibility,
        features.popularity,
        features.relative_capacity,
        features.relative_cost,
        features.composite_attractiveness,
        features.entry_fee,
        features.fragility as f64,
        features.ecosystem.code() as f64,
        features.ecosystem.adventure_affinity(),
        features.ecosystem.culture_affinity(),
        fee_to_budget,
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Quality figures measured on the held-out split (or on the training rows
/// when no split is configured).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDiagnostics {
    pub explained_variance: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub training_rows: usize,
    pub validation_rows: usize,
    pub n_trees: usize,
    /// Sorted by importance, most important first
    pub feature_importance: Vec<FeatureImportance>,
}

/// Fitted rating model plus the schema it expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingPredictor {
    model: GradientBoostedRegressor,
    schema: Vec<String>,
}

impl RatingPredictor {
    /// Fit on the corpus, holding out `validation_fraction` of the
    /// interactions for diagnostics.
    pub fn train(
        corpus: &SyntheticCorpus,
        table: &FeatureTable,
        params: &Hyperparameters,
    ) -> Result<(Self, ModelDiagnostics)> {
        params.validate().map_err(AppError::Validation)?;

        let mut rows: Vec<[f64; 17]> = Vec::with_capacity(corpus.interaction_count());
        let mut targets: Vec<f64> = Vec::with_capacity(corpus.interaction_count());
        for (profile, location_id, rating) in corpus.interactions() {
            let features = table.feature(location_id).ok_or_else(|| {
                AppError::Validation(format!(
                    "corpus references unknown location {}",
                    location_id
                ))
            })?;
            rows.push(feature_row(profile, features));
            targets.push(rating);
        }

        if rows.is_empty() {
            return Err(AppError::InsufficientData(
                "synthetic corpus has no interactions".to_string(),
            ));
        }

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(params.seed));
        let validation_rows = (rows.len() as f64 * params.validation_fraction).round() as usize;
        let (validation_idx, training_idx) = order.split_at(validation_rows);

        let x_train = to_matrix(&rows, training_idx)?;
        let y_train: Array1<f64> = training_idx.iter().map(|&i| targets[i]).collect();

        let model = GradientBoostedRegressor::fit(&x_train, &y_train, params)?;

        let (x_eval, y_eval) = if validation_idx.is_empty() {
            (x_train, y_train)
        } else {
            (
                to_matrix(&rows, validation_idx)?,
                validation_idx.iter().map(|&i| targets[i]).collect(),
            )
        };
        let predictions = model
            .predict_batch(&x_eval)
            .mapv(|p| p.clamp(MIN_RATING, MAX_RATING));

        let mut feature_importance: Vec<FeatureImportance> = FEATURE_SCHEMA
            .iter()
            .zip(model.feature_importance())
            .map(|(name, importance)| FeatureImportance {
                feature: name.to_string(),
                importance,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        let diagnostics = ModelDiagnostics {
            explained_variance: explained_variance(&y_eval, &predictions),
            rmse: rmse(&y_eval, &predictions),
            mae: mae(&y_eval, &predictions),
            r2: r2(&y_eval, &predictions),
            training_rows: training_idx.len(),
            validation_rows: validation_idx.len(),
            n_trees: model.n_trees(),
            feature_importance,
        };

        tracing::info!(
            explained_variance = diagnostics.explained_variance,
            rmse = diagnostics.rmse,
            r2 = diagnostics.r2,
            training_rows = diagnostics.training_rows,
            validation_rows = diagnostics.validation_rows,
            "Trained rating model"
        );

        Ok((
            RatingPredictor {
                model,
                schema: FEATURE_SCHEMA.iter().map(|name| name.to_string()).collect(),
            },
            diagnostics,
        ))
    }

    /// Predicted rating, always within [1, 5].
    pub fn predict(&self, profile: &UserProfile, features: &EngineeredFeatures) -> f64 {
        let row = Array1::from(feature_row(profile, features).to_vec());
        let raw = self.model.predict(row.view());
        if raw.is_finite() {
            raw.clamp(MIN_RATING, MAX_RATING)
        } else {
            NEUTRAL_RATING
        }
    }

    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Reject a deserialized predictor whose feature layout differs from the
    /// one rows are built with here, or whose trees cannot be evaluated.
    pub fn check_compatible(&self) -> Result<()> {
        if !self.schema.iter().map(String::as_str).eq(FEATURE_SCHEMA) {
            return Err(AppError::Validation(format!(
                "model expects features {:?}",
                self.schema
            )));
        }
        self.model.check_structure(FEATURE_SCHEMA.len())
    }
}

fn to_matrix(rows: &[[f64; 17]], indices: &[usize]) -> Result<Array2<f64>> {
    let flat: Vec<f64> = indices.iter().flat_map(|&i| rows[i]).collect();
    Array2::from_shape_vec((indices.len(), FEATURE_SCHEMA.len()), flat)
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn variance(values: &Array1<f64>) -> f64 {
    let mean = values.mean().unwrap_or(0.0);
    values.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(0.0)
}

pub fn explained_variance(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let total = variance(actual);
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - variance(&(actual - predicted)) / total
}

pub fn r2(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let mean = actual.mean().unwrap_or(0.0);
    let total: f64 = actual.iter().map(|v| (v - mean).powi(2)).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let residual: f64 = (actual - predicted).iter().map(|e| e * e).sum();
    1.0 - residual / total
}

pub fn rmse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    (actual - predicted).mapv(|e| e * e).mean().unwrap_or(0.0).sqrt()
}

pub fn mae(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    (actual - predicted).mapv(f64::abs).mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureWeights, MlConfig};
    use crate::models::{Coordinates, EcosystemType, Location};
    use crate::services::features::FeatureEngineer;
    use ndarray::array;

    fn table() -> FeatureTable {
        let catalog: Vec<Location> = (1..=15)
            .map(|id| {
                Location::new(
                    id,
                    format!("Site {}", id),
                    "Namibe",
                    Coordinates::new(-8.5 - id as f64 * 0.4, 12.5 + id as f64 * 0.25).unwrap(),
                    (id % 5 + 1) as u8,
                    (id * 35) as i64,
                    (id * 900) as f64,
                    EcosystemType::ALL[id as usize % EcosystemType::ALL.len()],
                )
            })
            .collect();
        FeatureEngineer::new(
            FeatureWeights::default(),
            Coordinates::new(-8.839, 13.2894).unwrap(),
        )
        .compute(&catalog)
        .unwrap()
    }

    fn small_params() -> Hyperparameters {
        Hyperparameters {
            n_trees: 40,
            ..Hyperparameters::default()
        }
    }

    #[test]
    fn test_metrics() {
        let actual = array![1.0, 2.0, 3.0, 4.0];
        assert_eq!(r2(&actual, &actual), 1.0);
        assert_eq!(explained_variance(&actual, &actual), 1.0);
        assert_eq!(rmse(&actual, &actual), 0.0);

        let shifted = array![2.0, 3.0, 4.0, 5.0];
        // A constant offset keeps explained variance but hurts R² and RMSE
        assert!((explained_variance(&actual, &shifted) - 1.0).abs() < 1e-12);
        assert!(r2(&actual, &shifted) < 1.0);
        assert!((rmse(&actual, &shifted) - 1.0).abs() < 1e-12);
        assert!((mae(&actual, &shifted) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_train_and_predict() {
        let table = table();
        let corpus = SyntheticCorpus::generate(&table, 300, &MlConfig::default(), 42).unwrap();
        let (predictor, diagnostics) =
            RatingPredictor::train(&corpus, &table, &small_params()).unwrap();

        assert_eq!(predictor.schema().len(), FEATURE_SCHEMA.len());
        assert_eq!(
            diagnostics.training_rows + diagnostics.validation_rows,
            corpus.interaction_count()
        );
        assert!(diagnostics.validation_rows > 0);
        assert!(diagnostics.explained_variance > 0.3, "{:?}", diagnostics);
        assert!(diagnostics.rmse < 1.0);
        assert_eq!(diagnostics.feature_importance.len(), FEATURE_SCHEMA.len());

        for f in table.features() {
            let rating = predictor.predict(&UserProfile::new(30, 20_000.0, 0.8, 0.6, 0.7), f);
            assert!((MIN_RATING..=MAX_RATING).contains(&rating));
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let table = table();
        let corpus = SyntheticCorpus::generate(&table, 100, &MlConfig::default(), 3).unwrap();
        let (a, da) = RatingPredictor::train(&corpus, &table, &small_params()).unwrap();
        let (b, db) = RatingPredictor::train(&corpus, &table, &small_params()).unwrap();
        assert_eq!(da, db);

        let profile = UserProfile::new(45, 30_000.0, 0.2, 0.9, 0.4);
        for f in table.features() {
            assert_eq!(a.predict(&profile, f), b.predict(&profile, f));
        }
    }

    #[test]
    fn test_restored_predictor_is_compatible() {
        let table = table();
        let corpus = SyntheticCorpus::generate(&table, 100, &MlConfig::default(), 5).unwrap();
        let (predictor, _) = RatingPredictor::train(&corpus, &table, &small_params()).unwrap();
        assert!(predictor.check_compatible().is_ok());

        let json = serde_json::to_string(&predictor).unwrap();
        let restored: RatingPredictor = serde_json::from_str(&json).unwrap();
        assert!(restored.check_compatible().is_ok());
        let profile = UserProfile::new(30, 20_000.0, 0.8, 0.6, 0.7);
        for f in table.features() {
            assert_eq!(restored.predict(&profile, f), predictor.predict(&profile, f));
        }

        let mut renamed = restored;
        renamed.schema[0] = "height".to_string();
        assert!(matches!(renamed.check_compatible(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let table = table();
        let result = RatingPredictor::train(&SyntheticCorpus::default(), &table, &small_params());
        assert!(matches!(result, Err(AppError::InsufficientData(_))));
    }

    #[test]
    fn test_feature_row_layout() {
        let table = table();
        let f = table.feature(3).unwrap();
        let row = feature_row(&UserProfile::new(30, 10_000.0, 0.1, 0.2, 0.3), f);
        assert_eq!(row[0], 30.0);
        assert_eq!(row[4], 0.3);
        assert_eq!(row[11], 2_700.0);
        assert!((row[16] - 0.27).abs() < 1e-12);
    }
}
