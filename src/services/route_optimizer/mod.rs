pub mod ranking;
pub mod relevance;
pub mod scoring;
pub mod tour;

use crate::config::RouteConfig;
use crate::constants::{MAX_FRAGILITY, MIN_FRAGILITY, MIN_ROUTE_LOCATIONS};
use crate::error::{AppError, Result};
use crate::models::{Coordinates, Location, Route};
use crate::services::features::EngineeredFeatures;
use std::collections::HashMap;

pub use ranking::{
    AnchoredRanking, PredictedRatingRanking, RankingStrategy, ReusePenaltyRanking,
    SustainabilityRanking,
};
pub use relevance::{rank_routes, relevance_score};
pub use scoring::sustainability_score;
pub use tour::order_tour;

/// A location offered to the optimizer, with everything a ranking needs.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub location: &'a Location,
    pub features: &'a EngineeredFeatures,
    pub cluster: usize,
    pub predicted_rating: Option<f64>,
    pub collaborative_bonus: f64,
}

/// Hard limits for one route. The optimizer never relaxes them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteConstraints {
    pub max_locations: usize,
    pub max_budget: f64,
    pub max_fragility: u8,
    /// Upper bound on a single location's entry fee
    pub max_fee_per_location: f64,
}

impl RouteConstraints {
    pub fn new(max_locations: usize, max_budget: f64, max_fragility: u8) -> Self {
        Self {
            max_locations,
            max_budget,
            max_fragility,
            max_fee_per_location: max_budget,
        }
    }

    pub fn with_max_fee_per_location(mut self, fee: f64) -> Self {
        self.max_fee_per_location = fee;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_locations < MIN_ROUTE_LOCATIONS {
            return Err(AppError::Validation(format!(
                "max_locations must be at least {} (got {})",
                MIN_ROUTE_LOCATIONS, self.max_locations
            )));
        }
        if !self.max_budget.is_finite() || self.max_budget <= 0.0 {
            return Err(AppError::Validation(format!(
                "max_budget must be positive (got {})",
                self.max_budget
            )));
        }
        if !(MIN_FRAGILITY..=MAX_FRAGILITY).contains(&self.max_fragility) {
            return Err(AppError::Validation(format!(
                "max_fragility must be between {} and {} (got {})",
                MIN_FRAGILITY, MAX_FRAGILITY, self.max_fragility
            )));
        }
        if self.max_fee_per_location.is_nan() || self.max_fee_per_location < 0.0 {
            return Err(AppError::Validation(
                "max_fee_per_location must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Selects, orders and scores the stops of a single route. Shared by both
/// generation modes; the [`RankingStrategy`] is the only thing that differs.
pub struct RouteOptimizer {
    config: RouteConfig,
}

impl RouteOptimizer {
    pub fn new(config: RouteConfig) -> Self {
        Self { config }
    }

    pub fn reference_point(&self) -> &Coordinates {
        &self.config.reference_point
    }

    /// Build one route from `candidates` under `constraints`.
    ///
    /// 1. drop candidates over the fragility ceiling or whose fee alone
    ///    exceeds the budget
    /// 2. greedily pick by ranking priority within the cumulative budget,
    ///    spreading picks across clusters
    /// 3. order the picks with a nearest-neighbor tour
    /// 4. aggregate distance, cost and fragility, and score the result
    pub fn build_route(
        &self,
        candidates: &[Candidate],
        constraints: &RouteConstraints,
        ranking: &dyn RankingStrategy,
    ) -> Result<Route> {
        constraints.validate()?;

        let feasible: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.location.fragility <= constraints.max_fragility)
            .filter(|c| {
                c.location.entry_fee <= constraints.max_budget
                    && c.location.entry_fee <= constraints.max_fee_per_location
            })
            .collect();

        if feasible.len() < MIN_ROUTE_LOCATIONS {
            return Err(AppError::NoFeasibleRoute(format!(
                "only {} of {} candidates satisfy fragility <= {} and budget {:.0}",
                feasible.len(),
                candidates.len(),
                constraints.max_fragility,
                constraints.max_budget
            )));
        }

        let selected = self.select(&feasible, constraints, ranking);
        if selected.len() < MIN_ROUTE_LOCATIONS {
            return Err(AppError::NoFeasibleRoute(format!(
                "budget {:.0} admits only {} location(s)",
                constraints.max_budget,
                selected.len()
            )));
        }

        let start = ranking.tour_start(&selected, &self.config.reference_point);
        let points: Vec<(u32, Coordinates)> = selected
            .iter()
            .map(|c| (c.location.id, c.location.coordinates))
            .collect();
        let ordered: Vec<Candidate> = tour::nearest_neighbor_order(&points, start)
            .into_iter()
            .map(|i| selected[i].clone())
            .collect();

        let route = scoring::assemble_route(ranking.mode(), &ordered, &self.config.score_weights);

        tracing::debug!(
            mode = %route.mode,
            stops = route.len(),
            distance_km = route.total_distance_km,
            cost = route.total_cost,
            score = route.sustainability_score,
            "Built route"
        );

        Ok(route)
    }

    /// Greedy selection by priority. The first pass takes at most one
    /// location per cluster, the second up to `max_per_cluster`, and a final
    /// pass fills remaining slots regardless of cluster.
    fn select<'c>(
        &self,
        feasible: &[&Candidate<'c>],
        constraints: &RouteConstraints,
        ranking: &dyn RankingStrategy,
    ) -> Vec<Candidate<'c>> {
        let mut ranked: Vec<(f64, &Candidate<'c>)> =
            feasible.iter().map(|c| (ranking.priority(c), *c)).collect();
        ranked.sort_by(|(pa, a), (pb, b)| pb.total_cmp(pa).then(a.location.id.cmp(&b.location.id)));

        let caps = [1, self.config.max_per_cluster.max(1), usize::MAX];
        let mut selected: Vec<Candidate<'c>> = Vec::new();
        let mut per_cluster: HashMap<usize, usize> = HashMap::new();
        let mut spent = 0.0;

        for cap in caps {
            for (_, candidate) in &ranked {
                if selected.len() >= constraints.max_locations {
                    return selected;
                }
                if selected.iter().any(|s| s.location.id == candidate.location.id) {
                    continue;
                }
                let in_cluster = per_cluster.get(&candidate.cluster).copied().unwrap_or(0);
                if in_cluster >= cap {
                    continue;
                }
                if spent + candidate.location.entry_fee > constraints.max_budget {
                    continue;
                }
                spent += candidate.location.entry_fee;
                *per_cluster.entry(candidate.cluster).or_insert(0) += 1;
                selected.push((*candidate).clone());
            }
        }

        selected
    }
}
