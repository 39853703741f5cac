//! Recommendation orchestrator.
//!
//! The engine owns an immutable [`EngineSnapshot`] behind an `Arc`. Requests
//! clone the `Arc` and work on that snapshot without further locking; `load`
//! and `train_ml` build a complete replacement first and publish it with a
//! single pointer swap, so no request ever observes a half-built model.

use crate::config::{EngineConfig, Hyperparameters};
use crate::constants::{MAX_FRAGILITY, MIN_FRAGILITY, MIN_ROUTE_LOCATIONS};
use crate::error::{AppError, Result};
use crate::ml::{CollaborativeFilter, ModelDiagnostics, RatingPredictor, SyntheticCorpus};
use crate::models::{Location, Route, RouteBatch, UserProfile};
use crate::services::route_optimizer::{
    rank_routes, AnchoredRanking, Candidate, PredictedRatingRanking, RankingStrategy,
    ReusePenaltyRanking, RouteConstraints, RouteOptimizer, SustainabilityRanking,
};
use crate::services::{
    CatalogStatistics, ClusterAssignment, ClusteringEngine, FeatureEngineer, FeatureTable,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Uninitialized,
    /// Catalog loaded, no model yet; only traditional routes are available
    Untrained,
    Trained,
}

/// Everything derived from one catalog load.
#[derive(Debug)]
pub struct CatalogState {
    pub features: FeatureTable,
    pub clusters: ClusterAssignment,
    pub statistics: CatalogStatistics,
}

/// Fitted personalization model. Tied to the catalog it was trained on,
/// whose location ids it records so a saved model is never paired with a
/// different catalog.
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    pub catalog_ids: Vec<u32>,
    pub predictor: RatingPredictor,
    pub collaborative: CollaborativeFilter,
    pub diagnostics: ModelDiagnostics,
    pub corpus_users: usize,
    pub corpus_interactions: usize,
}

/// Immutable view of the engine state. Replaced wholesale, never mutated.
#[derive(Debug, Default)]
pub struct EngineSnapshot {
    pub catalog: Option<Arc<CatalogState>>,
    pub model: Option<Arc<TrainedModel>>,
}

impl EngineSnapshot {
    pub fn status(&self) -> EngineStatus {
        match (&self.catalog, &self.model) {
            (None, _) => EngineStatus::Uninitialized,
            (Some(_), None) => EngineStatus::Untrained,
            (Some(_), Some(_)) => EngineStatus::Trained,
        }
    }

    fn require_catalog(&self) -> Result<&Arc<CatalogState>> {
        self.catalog.as_ref().ok_or_else(|| {
            AppError::InsufficientData("no catalog loaded; call load first".to_string())
        })
    }
}

/// One entry of the personalized candidate ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub location_id: u32,
    pub name: String,
    pub predicted_rating: f64,
    pub collaborative_bonus: f64,
    pub priority: f64,
}

pub struct RecommendationEngine {
    config: EngineConfig,
    optimizer: RouteOptimizer,
    state: RwLock<Arc<EngineSnapshot>>,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let optimizer = RouteOptimizer::new(config.route.clone());
        Self {
            config,
            optimizer,
            state: RwLock::new(Arc::new(EngineSnapshot::default())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current snapshot. Holding it keeps that state alive even if the
    /// engine is reloaded or retrained meanwhile.
    pub fn snapshot(&self) -> Result<Arc<EngineSnapshot>> {
        self.state
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| AppError::Internal("engine state lock poisoned".to_string()))
    }

    pub fn status(&self) -> Result<EngineStatus> {
        Ok(self.snapshot()?.status())
    }

    pub fn statistics(&self) -> Result<CatalogStatistics> {
        Ok(self.snapshot()?.require_catalog()?.statistics.clone())
    }

    pub fn clusters(&self) -> Result<ClusterAssignment> {
        Ok(self.snapshot()?.require_catalog()?.clusters.clone())
    }

    pub fn diagnostics(&self) -> Result<Option<ModelDiagnostics>> {
        Ok(self
            .snapshot()?
            .model
            .as_ref()
            .map(|m| m.diagnostics.clone()))
    }

    fn publish(&self, snapshot: EngineSnapshot) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| AppError::Internal("engine state lock poisoned".to_string()))?;
        *guard = Arc::new(snapshot);
        Ok(())
    }

    /// Validate the catalog, engineer features and cluster it. Replaces any
    /// previous catalog and drops the trained model, which no longer matches.
    /// Calling it twice with the same catalog yields the same state.
    pub fn load(&self, catalog: &[Location]) -> Result<CatalogStatistics> {
        if catalog.is_empty() {
            return Err(AppError::InsufficientData("catalog is empty".to_string()));
        }

        let engineer =
            FeatureEngineer::new(self.config.features, self.config.route.reference_point);
        let features = engineer.compute(catalog)?;

        let clustering = ClusteringEngine::new(self.config.clustering.clone());
        let k = clustering.effective_k(features.len());
        let clusters = clustering.fit(&features, k)?;
        let statistics = CatalogStatistics::compute(features.locations());

        tracing::info!(
            locations = statistics.location_count,
            provinces = statistics.province_count,
            clusters = clusters.k,
            "Catalog loaded"
        );

        self.publish(EngineSnapshot {
            catalog: Some(Arc::new(CatalogState {
                features,
                clusters,
                statistics: statistics.clone(),
            })),
            model: None,
        })?;

        Ok(statistics)
    }

    /// Generate a synthetic corpus of `corpus_size` users, fit the rating
    /// model and build the collaborative index, then publish them together.
    pub fn train_ml(
        &self,
        corpus_size: usize,
        hyperparameters: &Hyperparameters,
    ) -> Result<ModelDiagnostics> {
        hyperparameters.validate().map_err(AppError::Validation)?;
        if corpus_size == 0 {
            return Err(AppError::Validation(
                "corpus_size must be at least 1".to_string(),
            ));
        }

        let snapshot = self.snapshot()?;
        let catalog = Arc::clone(snapshot.require_catalog()?);

        tracing::info!(corpus_size, "Training personalization model");
        let corpus = SyntheticCorpus::generate(
            &catalog.features,
            corpus_size,
            &self.config.ml,
            self.config.ml.corpus_seed,
        )?;
        let (predictor, diagnostics) =
            RatingPredictor::train(&corpus, &catalog.features, hyperparameters)?;
        let collaborative = CollaborativeFilter::build(&corpus, &self.config.ml);

        let model = Arc::new(TrainedModel {
            catalog_ids: catalog_ids(&catalog.features),
            predictor,
            collaborative,
            diagnostics: diagnostics.clone(),
            corpus_users: corpus.users.len(),
            corpus_interactions: corpus.interaction_count(),
        });

        self.publish_model(&catalog, model)?;

        tracing::info!(
            explained_variance = diagnostics.explained_variance,
            rmse = diagnostics.rmse,
            "Personalization model published"
        );
        Ok(diagnostics)
    }

    /// Swap in `model` for `catalog`, unless the catalog was replaced since
    /// the model was built against it.
    fn publish_model(&self, catalog: &Arc<CatalogState>, model: Arc<TrainedModel>) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| AppError::Internal("engine state lock poisoned".to_string()))?;
        match guard.catalog.clone() {
            Some(current) if Arc::ptr_eq(&current, catalog) => {
                *guard = Arc::new(EngineSnapshot {
                    catalog: Some(current),
                    model: Some(model),
                });
                Ok(())
            }
            _ => Err(AppError::Internal(
                "catalog was replaced while the model was prepared; retry against the new catalog"
                    .to_string(),
            )),
        }
    }

    /// Write the trained model to `path` as JSON.
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;
        let model = snapshot.model.as_ref().ok_or_else(|| {
            AppError::ModelNotReady("no trained model to save".to_string())
        })?;

        let json = serde_json::to_string(model.as_ref())?;
        std::fs::write(path, json)?;

        tracing::info!(
            path = %path.display(),
            locations = model.catalog_ids.len(),
            "Saved personalization model"
        );
        Ok(())
    }

    /// Read a model written by [`save_model`](Self::save_model) and publish
    /// it for the loaded catalog. The model must have been trained on a
    /// catalog with exactly the same location ids.
    pub fn load_model(&self, path: impl AsRef<Path>) -> Result<ModelDiagnostics> {
        let path = path.as_ref();
        let snapshot = self.snapshot()?;
        let catalog = Arc::clone(snapshot.require_catalog()?);

        let raw = std::fs::read_to_string(path)?;
        let model: TrainedModel = serde_json::from_str(&raw)?;
        model.predictor.check_compatible()?;

        let expected = catalog_ids(&catalog.features);
        if model.catalog_ids != expected {
            return Err(AppError::Validation(format!(
                "model at {} was trained on another catalog ({} locations, loaded has {})",
                path.display(),
                model.catalog_ids.len(),
                expected.len()
            )));
        }

        let diagnostics = model.diagnostics.clone();
        self.publish_model(&catalog, Arc::new(model))?;

        tracing::info!(
            path = %path.display(),
            explained_variance = diagnostics.explained_variance,
            "Loaded personalization model"
        );
        Ok(diagnostics)
    }

    /// Sustainability-ranked routes. Requires only a loaded catalog.
    pub fn generate_traditional_routes(
        &self,
        max_budget: f64,
        max_locations: usize,
        max_fragility: u8,
        num_routes: usize,
    ) -> Result<RouteBatch> {
        validate_request(max_budget, max_locations, max_fragility, num_routes)?;

        let snapshot = self.snapshot()?;
        let catalog = snapshot.require_catalog()?;

        let candidates = sustainability_candidates(catalog)?;
        let constraints = RouteConstraints::new(max_locations, max_budget, max_fragility);

        tracing::info!(
            max_budget,
            max_locations,
            max_fragility,
            num_routes,
            "Generating traditional routes"
        );

        self.generate_batch(&candidates, &constraints, &SustainabilityRanking, num_routes)
    }

    /// Routes ranked by predicted rating for `profile`. Fails with
    /// `ModelNotReady` until `train_ml` has succeeded for the current catalog.
    pub fn generate_ml_routes(
        &self,
        profile: &UserProfile,
        max_locations: usize,
        num_routes: usize,
    ) -> Result<RouteBatch> {
        let snapshot = self.snapshot()?;
        let model = snapshot.model.as_ref().ok_or_else(|| {
            AppError::ModelNotReady(
                "call train_ml before requesting personalized routes".to_string(),
            )
        })?;
        let catalog = snapshot.require_catalog()?;

        profile.validate().map_err(AppError::Validation)?;
        let max_fragility = self.config.route.default_max_fragility;
        validate_request(profile.max_budget, max_locations, max_fragility, num_routes)?;

        let candidates = self.personalized_candidates(catalog, model, profile)?;
        let constraints = RouteConstraints::new(max_locations, profile.max_budget, max_fragility)
            .with_max_fee_per_location(
                profile.max_budget * self.config.route.max_fee_share_per_location,
            );

        tracing::info!(
            age = profile.age,
            max_budget = profile.max_budget,
            max_locations,
            num_routes,
            "Generating personalized routes"
        );

        self.generate_batch(&candidates, &constraints, &PredictedRatingRanking, num_routes)
    }

    /// Personalized candidate ranking, best first: predicted rating plus
    /// collaborative bonus. Same model and profile always give the same list.
    pub fn rank_ml_candidates(&self, profile: &UserProfile) -> Result<Vec<RankedCandidate>> {
        let snapshot = self.snapshot()?;
        let model = snapshot.model.as_ref().ok_or_else(|| {
            AppError::ModelNotReady("call train_ml before ranking candidates".to_string())
        })?;
        let catalog = snapshot.require_catalog()?;
        profile.validate().map_err(AppError::Validation)?;

        let ranking = PredictedRatingRanking;
        let mut ranked: Vec<RankedCandidate> = self
            .personalized_candidates(catalog, model, profile)?
            .iter()
            .map(|c| RankedCandidate {
                location_id: c.location.id,
                name: c.location.name.clone(),
                predicted_rating: c.predicted_rating.unwrap_or_default(),
                collaborative_bonus: c.collaborative_bonus,
                priority: ranking.priority(c),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then(a.location_id.cmp(&b.location_id))
        });
        Ok(ranked)
    }

    /// Re-rank finished routes by how well they suit `profile`: its
    /// sustainability preference, budget fit, diversity and route score.
    /// Needs no model, so it applies to routes of either mode.
    pub fn rank_routes(
        &self,
        batch: &RouteBatch,
        profile: &UserProfile,
    ) -> Result<Vec<(Route, f64)>> {
        profile.validate().map_err(AppError::Validation)?;
        Ok(rank_routes(batch, profile))
    }

    fn personalized_candidates<'a>(
        &self,
        catalog: &'a CatalogState,
        model: &TrainedModel,
        profile: &UserProfile,
    ) -> Result<Vec<Candidate<'a>>> {
        let recommended = model.collaborative.recommend(profile);
        let bonus_of = |id: u32| -> f64 {
            recommended
                .iter()
                .position(|&r| r == id)
                .map(|rank| {
                    self.config.ml.collaborative_bonus
                        * (1.0 - rank as f64 / recommended.len() as f64)
                })
                .unwrap_or(0.0)
        };

        catalog
            .features
            .iter()
            .map(|(location, features)| {
                Ok(Candidate {
                    location,
                    features,
                    cluster: cluster_of(catalog, location.id)?,
                    predicted_rating: Some(model.predictor.predict(profile, features)),
                    collaborative_bonus: bonus_of(location.id),
                })
            })
            .collect()
    }

    /// Build up to `num_routes` distinct routes.
    ///
    /// Reuse policy: each route is first built from locations no earlier
    /// route in the batch used. Only when that fails are used locations
    /// offered again, penalised by how often they were already used, and the
    /// batch is flagged `reused_locations`. A route with the same stop set as
    /// an earlier one is never returned.
    fn generate_batch(
        &self,
        candidates: &[Candidate],
        constraints: &RouteConstraints,
        ranking: &dyn RankingStrategy,
        num_routes: usize,
    ) -> Result<RouteBatch> {
        let mut routes: Vec<Route> = Vec::with_capacity(num_routes);
        let mut used: HashSet<u32> = HashSet::new();
        let mut seen: HashSet<Vec<u32>> = HashSet::new();
        let mut reused_locations = false;
        let mut last_error: Option<AppError> = None;

        for slot in 0..num_routes {
            let unused: Vec<Candidate> = candidates
                .iter()
                .filter(|c| !used.contains(&c.location.id))
                .cloned()
                .collect();

            let mut best =
                self.best_variant(&unused, constraints, ranking, &seen, &mut last_error)?;
            if best.is_none() && !routes.is_empty() {
                best = self.reuse_variant(
                    candidates,
                    constraints,
                    ranking,
                    &routes,
                    &seen,
                    &mut last_error,
                )?;
            }

            let Some(route) = best else {
                tracing::info!(slot, "No further distinct route available");
                break;
            };

            if route.location_ids().iter().any(|id| used.contains(id)) {
                reused_locations = true;
                tracing::debug!(slot, "Reusing locations from earlier routes");
            }
            used.extend(route.location_ids());
            seen.insert(stop_set(&route));
            let name = format!("{} {}", ranking.mode().route_label(), slot + 1);
            tracing::debug!(
                route = %name,
                stops = route.len(),
                score = route.sustainability_score,
                "Route selected"
            );
            routes.push(route.with_name(name));
        }

        if routes.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                AppError::NoFeasibleRoute("no route satisfies the constraints".to_string())
            }));
        }

        let partial = routes.len() < num_routes;
        let shortfall = partial.then(|| {
            format!(
                "only {} of {} requested routes could be built; \
                 no further distinct stop set satisfies the constraints",
                routes.len(),
                num_routes
            )
        });
        if partial {
            tracing::warn!(built = routes.len(), requested = num_routes, "Partial route batch");
        }

        Ok(RouteBatch {
            routes,
            requested: num_routes,
            partial,
            reused_locations,
            shortfall,
        })
    }

    /// Best new route once the unused pool is exhausted. Every candidate is
    /// eligible again, with priority lowered per earlier use. Besides the
    /// full pool, one pool per used location leaves that location out, so
    /// each earlier route yields neighbouring stop sets that differ from it.
    fn reuse_variant(
        &self,
        candidates: &[Candidate],
        constraints: &RouteConstraints,
        ranking: &dyn RankingStrategy,
        routes: &[Route],
        seen: &HashSet<Vec<u32>>,
        last_error: &mut Option<AppError>,
    ) -> Result<Option<Route>> {
        let mut uses: HashMap<u32, usize> = HashMap::new();
        for route in routes {
            for id in route.location_ids() {
                *uses.entry(id).or_insert(0) += 1;
            }
        }
        let penalized = ReusePenaltyRanking::new(ranking, &uses);

        let mut best = self.best_variant(candidates, constraints, &penalized, seen, last_error)?;

        let dropped: BTreeSet<u32> = uses.keys().copied().collect();
        for id in dropped {
            let pool: Vec<Candidate> = candidates
                .iter()
                .filter(|c| c.location.id != id)
                .cloned()
                .collect();
            let Some(route) =
                self.best_variant(&pool, constraints, &penalized, seen, last_error)?
            else {
                continue;
            };
            let better = match &best {
                Some(current) => ranking.compare_routes(&route, current).is_lt(),
                None => true,
            };
            if better {
                best = Some(route);
            }
        }

        Ok(best)
    }

    /// Best new route over `pool`: one variant without an anchor and one
    /// anchored on each cluster present in the pool. Variants whose stop set
    /// was already returned are discarded. Infeasibility is recorded in
    /// `last_error`; any other failure aborts the request.
    fn best_variant(
        &self,
        pool: &[Candidate],
        constraints: &RouteConstraints,
        ranking: &dyn RankingStrategy,
        seen: &HashSet<Vec<u32>>,
        last_error: &mut Option<AppError>,
    ) -> Result<Option<Route>> {
        let clusters: BTreeSet<usize> = pool.iter().map(|c| c.cluster).collect();
        let anchored: Vec<AnchoredRanking> = clusters
            .iter()
            .map(|&cluster| AnchoredRanking::new(ranking, cluster))
            .collect();
        let variants: Vec<&dyn RankingStrategy> = std::iter::once(ranking)
            .chain(anchored.iter().map(|a| a as &dyn RankingStrategy))
            .collect();

        let mut best: Option<Route> = None;
        for variant in variants {
            match self.optimizer.build_route(pool, constraints, variant) {
                Ok(route) => {
                    if seen.contains(&stop_set(&route)) {
                        continue;
                    }
                    let better = match &best {
                        Some(current) => ranking.compare_routes(&route, current).is_lt(),
                        None => true,
                    };
                    if better {
                        best = Some(route);
                    }
                }
                Err(e @ AppError::NoFeasibleRoute(_)) => *last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Ok(best)
    }
}

fn sustainability_candidates(catalog: &CatalogState) -> Result<Vec<Candidate<'_>>> {
    catalog
        .features
        .iter()
        .map(|(location, features)| {
            Ok(Candidate {
                location,
                features,
                cluster: cluster_of(catalog, location.id)?,
                predicted_rating: None,
                collaborative_bonus: 0.0,
            })
        })
        .collect()
}

/// Every loaded location is assigned a cluster on load.
fn cluster_of(catalog: &CatalogState, location_id: u32) -> Result<usize> {
    catalog.clusters.cluster_of(location_id).ok_or_else(|| {
        AppError::Internal(format!("location {} has no cluster assignment", location_id))
    })
}

fn catalog_ids(features: &FeatureTable) -> Vec<u32> {
    let mut ids: Vec<u32> = features.locations().iter().map(|l| l.id).collect();
    ids.sort_unstable();
    ids
}

fn stop_set(route: &Route) -> Vec<u32> {
    let mut ids = route.location_ids();
    ids.sort_unstable();
    ids
}

fn validate_request(
    max_budget: f64,
    max_locations: usize,
    max_fragility: u8,
    num_routes: usize,
) -> Result<()> {
    if !max_budget.is_finite() || max_budget <= 0.0 {
        return Err(AppError::Validation(format!(
            "max_budget must be positive (got {})",
            max_budget
        )));
    }
    if max_locations < MIN_ROUTE_LOCATIONS {
        return Err(AppError::Validation(format!(
            "max_locations must be at least {} (got {})",
            MIN_ROUTE_LOCATIONS, max_locations
        )));
    }
    if !(MIN_FRAGILITY..=MAX_FRAGILITY).contains(&max_fragility) {
        return Err(AppError::Validation(format!(
            "max_fragility must be between {} and {} (got {})",
            MIN_FRAGILITY, MAX_FRAGILITY, max_fragility
        )));
    }
    if num_routes == 0 {
        return Err(AppError::Validation(
            "num_routes must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
